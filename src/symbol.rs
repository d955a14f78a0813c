use std::{fmt, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::{
    codec,
    error::AsmError,
    lexer::{self, LineKind},
};

/// Address the cursor starts from when the source does not say otherwise.
pub const DEFAULT_ORIGIN: u16 = 0x3000;

/// Marks a register operand, as in `R3`.
pub const REGISTER_MARKER: char = 'R';

// Keeps definition order, which makes listings stable.
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Label name -> resolved address. Built by the first pass, read-only afterwards.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct SymbolTable {
    table: FxMap<String, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Record a label, returning the address it previously resolved to.
    pub fn insert(&mut self, name: &str, addr: u16) -> Option<u16> {
        self.table.insert(name.to_string(), addr)
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.table.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    /// Holds the return address after `JSR`/`JSRR`.
    R7,
}

impl Register {
    /// Field value used in instruction encodings.
    pub fn index(self) -> u16 {
        self as u16
    }
}

impl FromStr for Register {
    type Err = AsmError;

    /// Only the marker and the digit right after it are looked at.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let digit = match (chars.next(), chars.next()) {
            (Some(REGISTER_MARKER), Some(digit)) => digit,
            _ => return Err(AsmError::InvalidRegister(s.to_string())),
        };
        match digit {
            '0' => Ok(Register::R0),
            '1' => Ok(Register::R1),
            '2' => Ok(Register::R2),
            '3' => Ok(Register::R3),
            '4' => Ok(Register::R4),
            '5' => Ok(Register::R5),
            '6' => Ok(Register::R6),
            '7' => Ok(Register::R7),
            _ => Err(AsmError::InvalidRegister(s.to_string())),
        }
    }
}

/// Condition letters of a branch mnemonic. Any combination, including none, is allowed.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Condition {
    pub n: bool,
    pub z: bool,
    pub p: bool,
}

impl Condition {
    /// The `nzp` field, `n` being the high bit.
    pub fn bits(self) -> u16 {
        (self.n as u16) << 2 | (self.z as u16) << 1 | self.p as u16
    }
}

/// Every keyword that may start an instruction line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mnemonic {
    Add,
    And,
    Br(Condition),
    Jmp,
    Jsr,
    Jsrr,
    Ld,
    Ldi,
    Ldr,
    Lea,
    Not,
    Ret,
    St,
    Sti,
    Str,
    Halt,
    End,
    Word,
    Byte,
    Dec,
    Hex,
}

impl FromStr for Mnemonic {
    type Err = AsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mnemonic = match s {
            "ADD" => Mnemonic::Add,
            "AND" => Mnemonic::And,
            "JMP" => Mnemonic::Jmp,
            "JSR" => Mnemonic::Jsr,
            "JSRR" => Mnemonic::Jsrr,
            "LD" => Mnemonic::Ld,
            "LDI" => Mnemonic::Ldi,
            "LDR" => Mnemonic::Ldr,
            "LEA" => Mnemonic::Lea,
            "NOT" => Mnemonic::Not,
            "RET" => Mnemonic::Ret,
            "ST" => Mnemonic::St,
            "STI" => Mnemonic::Sti,
            "STR" => Mnemonic::Str,
            "HALT" => Mnemonic::Halt,
            "END" => Mnemonic::End,
            "WORD" | ".WORD" => Mnemonic::Word,
            "BYTE" | ".BYTE" => Mnemonic::Byte,
            "DEC" | ".DEC" => Mnemonic::Dec,
            "HEX" | ".HEX" => Mnemonic::Hex,
            other => {
                let letters = other
                    .strip_prefix("BR")
                    .ok_or_else(|| AsmError::InvalidOpcode(s.to_string()))?;
                let mut cond = Condition::default();
                for c in letters.chars() {
                    match c {
                        'n' => cond.n = true,
                        'z' => cond.z = true,
                        'p' => cond.p = true,
                        _ => return Err(AsmError::InvalidOpcode(s.to_string())),
                    }
                }
                Mnemonic::Br(cond)
            }
        };
        Ok(mnemonic)
    }
}

/// The sixteen values of the 4-bit opcode field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    Br = 0x0,
    Add = 0x1,
    Ld = 0x2,
    St = 0x3,
    Jsr = 0x4,
    And = 0x5,
    Ldr = 0x6,
    Str = 0x7,
    Rti = 0x8,
    Not = 0x9,
    Ldi = 0xA,
    Sti = 0xB,
    Jmp = 0xC,
    Reserved = 0xD,
    Lea = 0xE,
    Trap = 0xF,
}

impl Opcode {
    /// Top four bits of an instruction word.
    pub fn of(instr: u16) -> Opcode {
        match instr >> 12 {
            0x0 => Opcode::Br,
            0x1 => Opcode::Add,
            0x2 => Opcode::Ld,
            0x3 => Opcode::St,
            0x4 => Opcode::Jsr,
            0x5 => Opcode::And,
            0x6 => Opcode::Ldr,
            0x7 => Opcode::Str,
            0x8 => Opcode::Rti,
            0x9 => Opcode::Not,
            0xA => Opcode::Ldi,
            0xB => Opcode::Sti,
            0xC => Opcode::Jmp,
            0xD => Opcode::Reserved,
            0xE => Opcode::Lea,
            _ => Opcode::Trap,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Br => "BR",
            Opcode::Add => "ADD",
            Opcode::Ld => "LD",
            Opcode::St => "ST",
            Opcode::Jsr => "JSR",
            Opcode::And => "AND",
            Opcode::Ldr => "LDR",
            Opcode::Str => "STR",
            Opcode::Rti => "RTI",
            Opcode::Not => "NOT",
            Opcode::Ldi => "LDI",
            Opcode::Sti => "STI",
            Opcode::Jmp => "JMP",
            Opcode::Reserved => "RESERVED",
            Opcode::Lea => "LEA",
            Opcode::Trap => "TRAP",
        };
        f.write_str(name)
    }
}

/// A source line that matters to address bookkeeping, with the cursor value it sits at.
#[derive(Clone, PartialEq, Debug)]
pub struct Statement<'a> {
    /// One-based line number.
    pub line: usize,
    /// Cursor value when the line is reached.
    pub addr: u16,
    pub text: &'a str,
    pub kind: StatementKind<'a>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum StatementKind<'a> {
    /// Address directive. On error the cursor is left alone.
    Origin(Result<u16, AsmError>),
    /// Label definition. Only occupies a word if there is an inline instruction.
    Label {
        name: &'a str,
        inline: Option<&'a str>,
    },
    /// Occupies one word.
    Instruction(&'a str),
    /// Label or instruction reached after a word was placed at xFFFF. Gets no address.
    Overflow,
}

impl StatementKind<'_> {
    /// Instruction text that ends up at this statement's address, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            StatementKind::Label { inline, .. } => *inline,
            StatementKind::Instruction(code) => Some(code),
            StatementKind::Origin(_) | StatementKind::Overflow => None,
        }
    }
}

/// Walks the source the way both passes see it: blank and comment lines skipped, the address
/// cursor advanced once per word-sized statement, and scanning stopped at `END`.
pub struct Statements<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    addr: u16,
    /// Set once a word occupies xFFFF, until the next `ORG`.
    full: bool,
    done: bool,
}

impl<'a> Statements<'a> {
    pub fn new(src: &'a str, origin: u16) -> Self {
        Statements {
            lines: src.lines().enumerate(),
            addr: origin,
            full: false,
            done: false,
        }
    }
}

impl<'a> Iterator for Statements<'a> {
    type Item = Statement<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for (idx, text) in self.lines.by_ref() {
            let kind = match lexer::classify(text) {
                LineKind::Blank | LineKind::Comment => continue,
                LineKind::End => {
                    self.done = true;
                    return None;
                }
                LineKind::Origin(operand) => {
                    StatementKind::Origin(operand.map_or(Err(AsmError::MissingAddress), |addr| {
                        codec::parse_hex(addr).map_err(|err| match err {
                            AsmError::MalformedLiteral { source, .. } => {
                                AsmError::MalformedAddress {
                                    text: addr.to_string(),
                                    source,
                                }
                            }
                            other => other,
                        })
                    }))
                }
                LineKind::Label { .. } | LineKind::Instruction(_) if self.full => {
                    StatementKind::Overflow
                }
                LineKind::Label { name, inline } => StatementKind::Label { name, inline },
                LineKind::Instruction(code) => StatementKind::Instruction(code),
            };
            let stmt = Statement {
                line: idx + 1,
                addr: self.addr,
                text,
                kind,
            };
            match &stmt.kind {
                StatementKind::Origin(Ok(addr)) => {
                    self.addr = *addr;
                    self.full = false;
                }
                kind if kind.code().is_some() => match self.addr.checked_add(1) {
                    Some(next) => self.addr = next,
                    None => self.full = true,
                },
                _ => {}
            }
            return Some(stmt);
        }
        self.done = true;
        None
    }
}

/// First pass: resolve every label to the address of the word it precedes.
///
/// Problems found on the way (bad `ORG` operands, redefined labels) are pushed to `problems`
/// together with their line number.
pub fn first_pass(
    src: &str,
    origin: u16,
    problems: &mut Vec<(usize, AsmError)>,
) -> SymbolTable {
    let mut symbols = SymbolTable::new();
    for stmt in Statements::new(src, origin) {
        match stmt.kind {
            StatementKind::Origin(Ok(addr)) => {
                log::debug!("line {}: cursor set to x{addr:04X}", stmt.line);
            }
            StatementKind::Origin(Err(err)) => {
                log::warn!("line {}: {err}", stmt.line);
                problems.push((stmt.line, err));
            }
            StatementKind::Label { name, .. } => {
                if let Some(previous) = symbols.insert(name, stmt.addr) {
                    let err = AsmError::DuplicateLabel {
                        name: name.to_string(),
                        previous,
                    };
                    log::warn!("line {}: {err}", stmt.line);
                    problems.push((stmt.line, err));
                }
            }
            StatementKind::Overflow => {
                let err = AsmError::AddressOverflow;
                log::warn!("line {}: {err}", stmt.line);
                problems.push((stmt.line, err));
            }
            StatementKind::Instruction(_) => {}
        }
    }
    symbols
}
