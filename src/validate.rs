use crate::{
    codec,
    error::AsmError,
    symbol::{Mnemonic, Register, SymbolTable, REGISTER_MARKER},
};

/// Largest `WORD` value.
pub(crate) const WORD_MAX: u16 = 0xFFFF;
/// Largest `BYTE` value.
pub(crate) const BYTE_MAX: u16 = 0xFF;

/// Check an instruction's shape before it is encoded: operand count, register and immediate
/// ranges, and that referenced labels exist.
pub fn validate(tokens: &[&str], symbols: &SymbolTable) -> Result<(), AsmError> {
    let Some(&first) = tokens.first() else {
        return Err(AsmError::EmptyInstruction);
    };
    let mnemonic: Mnemonic = first.parse()?;

    match mnemonic {
        Mnemonic::Add | Mnemonic::And => {
            expect_count(tokens, 4)?;
            expect_reg(tokens[1])?;
            expect_reg(tokens[2])?;
            if tokens[3].starts_with(REGISTER_MARKER) {
                expect_reg(tokens[3])?;
            } else {
                let imm = codec::parse_immediate(tokens[3])?;
                if !codec::fits_signed(imm, 5) {
                    return Err(AsmError::ImmediateOutOfRange {
                        value: imm,
                        min: -16,
                        max: 15,
                    });
                }
            }
        }
        Mnemonic::Br(_) | Mnemonic::Jsr => {
            expect_count(tokens, 2)?;
            expect_label(tokens[1], symbols)?;
        }
        Mnemonic::Jmp | Mnemonic::Jsrr => {
            expect_count(tokens, 2)?;
            expect_reg(tokens[1])?;
        }
        Mnemonic::Ld | Mnemonic::Ldi | Mnemonic::Lea | Mnemonic::St | Mnemonic::Sti => {
            expect_count(tokens, 3)?;
            expect_reg(tokens[1])?;
            expect_label(tokens[2], symbols)?;
        }
        Mnemonic::Ldr | Mnemonic::Str => {
            expect_count(tokens, 4)?;
            expect_reg(tokens[1])?;
            expect_reg(tokens[2])?;
            let offset = codec::parse_offset(tokens[3])?;
            if !codec::fits_signed(offset, 6) {
                return Err(AsmError::OffsetOutOfRange {
                    value: offset,
                    min: -32,
                    max: 31,
                });
            }
        }
        Mnemonic::Not => {
            expect_count(tokens, 3)?;
            expect_reg(tokens[1])?;
            expect_reg(tokens[2])?;
        }
        Mnemonic::Ret | Mnemonic::Halt | Mnemonic::End => expect_count(tokens, 1)?,
        Mnemonic::Word => {
            expect_count(tokens, 2)?;
            codec::parse_unsigned(tokens[1], WORD_MAX)?;
        }
        Mnemonic::Byte => {
            expect_count(tokens, 2)?;
            codec::parse_unsigned(tokens[1], BYTE_MAX)?;
        }
        Mnemonic::Dec => {
            expect_count(tokens, 2)?;
            codec::parse_dec_word(tokens[1])?;
        }
        Mnemonic::Hex => {
            expect_count(tokens, 2)?;
            codec::parse_hex(tokens[1])?;
        }
    }
    Ok(())
}

/// Same as [`validate`], for callers that only need a yes or no.
pub fn is_valid(tokens: &[&str], symbols: &SymbolTable) -> bool {
    validate(tokens, symbols).is_ok()
}

fn expect_count(tokens: &[&str], expected: usize) -> Result<(), AsmError> {
    if tokens.len() == expected {
        Ok(())
    } else {
        Err(AsmError::OperandCount {
            mnemonic: tokens[0].to_string(),
            expected,
            found: tokens.len(),
        })
    }
}

fn expect_reg(token: &str) -> Result<Register, AsmError> {
    token.parse()
}

fn expect_label(token: &str, symbols: &SymbolTable) -> Result<u16, AsmError> {
    symbols
        .get(token)
        .ok_or_else(|| AsmError::UnknownLabel(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols.insert("LOOP", 0x3000);
        symbols.insert("DATA", 0x3010);
        symbols
    }

    fn check(line: &str) -> Result<(), AsmError> {
        validate(&crate::lexer::operands(line), &table())
    }

    #[test]
    fn empty() {
        assert_eq!(validate(&[], &table()), Err(AsmError::EmptyInstruction));
    }

    #[test]
    fn arithmetic() {
        assert!(check("ADD R1,R1,#5").is_ok());
        assert!(check("AND R0, R1, R2").is_ok());
        assert!(check("ADD R1,R1,#-16").is_ok());
        assert!(check("ADD R1,R1,#15").is_ok());
        assert_eq!(
            check("ADD R1,R1,#16"),
            Err(AsmError::ImmediateOutOfRange {
                value: 16,
                min: -16,
                max: 15
            })
        );
        assert!(check("ADD R1,R1,#-17").is_err());
        assert_eq!(
            check("ADD R1,R1,R9"),
            Err(AsmError::InvalidRegister("R9".to_string()))
        );
        assert_eq!(
            check("ADD R1,R1"),
            Err(AsmError::OperandCount {
                mnemonic: "ADD".to_string(),
                expected: 4,
                found: 3
            })
        );
        assert!(check("ADD R1,R1,5").is_err());
    }

    #[test]
    fn branches_and_calls() {
        assert!(check("BRn LOOP").is_ok());
        assert!(check("BRnzp LOOP").is_ok());
        assert!(check("JSR LOOP").is_ok());
        assert_eq!(
            check("BRz NOWHERE"),
            Err(AsmError::UnknownLabel("NOWHERE".to_string()))
        );
        assert!(check("BRp").is_err());
        assert!(check("JMP R3").is_ok());
        assert!(check("JSRR R7").is_ok());
        assert!(check("JMP LOOP").is_err());
    }

    #[test]
    fn label_memory_ops() {
        for op in ["LD", "LDI", "LEA", "ST", "STI"] {
            assert!(check(&format!("{op} R2, DATA")).is_ok(), "{op}");
            assert!(check(&format!("{op} R2, MISSING")).is_err(), "{op}");
            assert!(check(&format!("{op} R2")).is_err(), "{op}");
        }
    }

    #[test]
    fn base_offset_ops() {
        assert!(check("LDR R0, R6, #-32").is_ok());
        assert!(check("STR R0, R6, 31").is_ok());
        assert_eq!(
            check("LDR R0, R6, #32"),
            Err(AsmError::OffsetOutOfRange {
                value: 32,
                min: -32,
                max: 31
            })
        );
        assert!(check("STR R0, R8, #0").is_err());
    }

    #[test]
    fn unary_and_zero_operand() {
        assert!(check("NOT R1, R2").is_ok());
        assert!(check("NOT R1").is_err());
        assert!(check("RET").is_ok());
        assert!(check("HALT").is_ok());
        assert!(check("END").is_ok());
        assert!(check("HALT R0").is_err());
    }

    #[test]
    fn data_directives() {
        assert!(check("DEC -3").is_ok());
        assert!(check("DEC 65535").is_ok());
        assert!(check("DEC x12").is_err());
        assert!(check("HEX 0x3000").is_ok());
        assert!(check("HEX FFFF").is_ok());
        assert!(check("HEX 0xG").is_err());
        assert!(check("WORD 1234").is_ok());
        assert!(check("WORD -1").is_err());
        assert!(check("BYTE 255").is_ok());
        assert!(check("BYTE 256").is_err());
        assert!(check("DEC 1 2").is_err());
    }

    #[test]
    fn unknown_opcode() {
        assert_eq!(
            check("MUL R1, R2, R3"),
            Err(AsmError::InvalidOpcode("MUL".to_string()))
        );
        assert!(!is_valid(&["add", "R1", "R1", "#1"], &table()));
    }
}
