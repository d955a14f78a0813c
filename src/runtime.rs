use std::{cmp::Ordering, fmt};

use crate::{assembler::Assembly, encode::HALT_WORD, image::Memory, symbol::Opcode};

/// Mutually exclusive condition flags, valued as the `nzp` field of a branch.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CondCode {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

impl CondCode {
    /// Flag describing `value` read as two's complement.
    pub fn of(value: u16) -> Self {
        match (value as i16).cmp(&0) {
            Ordering::Less => CondCode::N,
            Ordering::Equal => CondCode::Z,
            Ordering::Greater => CondCode::P,
        }
    }

    pub fn bits(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CondCode::N => "N",
            CondCode::Z => "Z",
            CondCode::P => "P",
        };
        f.write_str(name)
    }
}

/// The register file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Registers {
    /// R0 through R7
    pub gpr: [u16; 8],
    pub pc: u16,
    pub mar: u16,
    pub mdr: u16,
    pub ir: u16,
    pub cc: CondCode,
}

impl Registers {
    /// Everything zeroed, `pc` at `origin`, condition code Z.
    pub fn new(origin: u16) -> Self {
        Registers {
            gpr: [0; 8],
            pc: origin,
            mar: 0,
            mdr: 0,
            ir: 0,
            cc: CondCode::Z,
        }
    }

    #[inline]
    pub fn reg(&self, idx: u16) -> u16 {
        self.gpr[(idx & 0b111) as usize]
    }

    #[inline]
    pub fn set_reg(&mut self, idx: u16, value: u16) {
        self.gpr[(idx & 0b111) as usize] = value;
    }

    /// Write a register and set the condition code from the written value.
    fn set_reg_flags(&mut self, idx: u16, value: u16) {
        self.set_reg(idx, value);
        self.cc = CondCode::of(value);
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, values) in self.gpr.chunks(4).enumerate() {
            let cells: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(j, value)| format!("R{} x{value:04X}", i * 4 + j))
                .collect();
            writeln!(f, "{}", cells.join("  "))?;
        }
        writeln!(
            f,
            "PC x{:04X}  MAR x{:04X}  MDR x{:04X}  IR x{:04X}",
            self.pc, self.mar, self.mdr, self.ir
        )?;
        let flag = |cc: CondCode| u8::from(self.cc == cc);
        write!(
            f,
            "N {}  Z {}  P {}",
            flag(CondCode::N),
            flag(CondCode::Z),
            flag(CondCode::P)
        )
    }
}

/// One step of the instruction cycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Fetch,
    Decode,
    EvaluateAddress,
    FetchOperands,
    Execute,
    Store,
    /// Terminal, entered when `HALT` is fetched.
    Halted,
}

impl Phase {
    /// Phase following this one. Store wraps back to fetch, halted stays halted.
    pub fn next(self) -> Phase {
        match self {
            Phase::Fetch => Phase::Decode,
            Phase::Decode => Phase::EvaluateAddress,
            Phase::EvaluateAddress => Phase::FetchOperands,
            Phase::FetchOperands => Phase::Execute,
            Phase::Execute => Phase::Store,
            Phase::Store => Phase::Fetch,
            Phase::Halted => Phase::Halted,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Fetch => "Fetch",
            Phase::Decode => "Decode",
            Phase::EvaluateAddress => "Evaluate Address",
            Phase::FetchOperands => "Fetch Operands",
            Phase::Execute => "Execute",
            Phase::Store => "Store",
            Phase::Halted => "Halted",
        };
        f.write_str(name)
    }
}

/// Sign-extend the low `bits` of `value` to a full word.
#[inline]
pub fn sign_extend(value: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    let sign = value & (1 << (bits - 1));
    let low = value & ((1 << bits) - 1);
    // Negating the sign bit sets it and every bit above it
    low | sign.wrapping_neg()
}

/// Fields of the instruction in IR, built at decode and filled in by the later phases of the
/// same cycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Decoded {
    pub opcode: Opcode,
    /// Bits 11..9: destination, store source, or branch `nzp`.
    pub dr: u16,
    /// Bits 8..6: first source or base register.
    pub sr1: u16,
    /// Bits 2..0
    pub sr2: u16,
    /// Bit 5 of `ADD`/`AND`.
    pub immediate: bool,
    /// Bit 11 of `JSR`, clear for `JSRR`.
    pub long: bool,
    pub imm5: u16,
    pub offset6: u16,
    pub offset9: u16,
    pub offset11: u16,
    /// Effective address.
    pub address: u16,
    /// ALU inputs, or the value to store.
    pub a: u16,
    pub b: u16,
    /// ALU output.
    pub result: u16,
}

impl Decoded {
    pub fn new(ir: u16) -> Self {
        Decoded {
            opcode: Opcode::of(ir),
            dr: (ir >> 9) & 0b111,
            sr1: (ir >> 6) & 0b111,
            sr2: ir & 0b111,
            immediate: ir & 0x20 != 0,
            long: ir & 0x800 != 0,
            imm5: sign_extend(ir, 5),
            offset6: sign_extend(ir, 6),
            offset9: sign_extend(ir, 9),
            offset11: sign_extend(ir, 11),
            address: 0,
            a: 0,
            b: 0,
            result: 0,
        }
    }
}

/// Register file and memory driven one phase at a time.
#[derive(Clone, Debug)]
pub struct Machine {
    pub registers: Registers,
    pub memory: Memory,
    decoded: Decoded,
    next: Phase,
    origin: u16,
}

impl Machine {
    pub fn new(memory: Memory, origin: u16) -> Self {
        Machine {
            registers: Registers::new(origin),
            memory,
            decoded: Decoded::new(0),
            next: Phase::Fetch,
            origin,
        }
    }

    /// Load an assembled program, starting at its first word.
    pub fn from_assembly(assembly: Assembly) -> Self {
        Machine::new(assembly.memory, assembly.origin)
    }

    pub fn is_halted(&self) -> bool {
        self.next == Phase::Halted
    }

    /// Phase the next [`step`](Machine::step) will run.
    pub fn next_phase(&self) -> Phase {
        self.next
    }

    pub fn decoded(&self) -> &Decoded {
        &self.decoded
    }

    /// Clear the register file and restart at the load origin. Memory is kept.
    pub fn reset(&mut self) {
        self.registers = Registers::new(self.origin);
        self.decoded = Decoded::new(0);
        self.next = Phase::Fetch;
    }

    /// Run exactly one phase and return the phase reached. Once halted, nothing changes and
    /// [`Phase::Halted`] is returned.
    pub fn step(&mut self) -> Phase {
        let phase = self.next;
        match phase {
            Phase::Fetch => self.fetch(),
            Phase::Decode => self.decode(),
            Phase::EvaluateAddress => self.evaluate_address(),
            Phase::FetchOperands => self.fetch_operands(),
            Phase::Execute => self.execute(),
            Phase::Store => self.store(),
            Phase::Halted => return Phase::Halted,
        }
        if self.registers.ir == HALT_WORD && phase == Phase::Fetch {
            log::debug!("HALT fetched from x{:04X}", self.registers.mar);
            self.next = Phase::Halted;
            return Phase::Halted;
        }
        log::trace!("{phase}: IR x{:04X} PC x{:04X}", self.registers.ir, self.registers.pc);
        self.next = phase.next();
        phase
    }

    /// Step until the current instruction is finished, or the machine halts.
    pub fn run_cycle(&mut self) -> Phase {
        loop {
            match self.step() {
                Phase::Halted => return Phase::Halted,
                Phase::Store => return Phase::Store,
                _ => {}
            }
        }
    }

    /// Run whole cycles until halted or `limit` cycles have run. Returns the number of cycles,
    /// the one that fetched `HALT` included.
    pub fn run(&mut self, limit: usize) -> usize {
        let mut cycles = 0;
        while !self.is_halted() && cycles < limit {
            self.run_cycle();
            cycles += 1;
        }
        cycles
    }

    fn fetch(&mut self) {
        let regs = &mut self.registers;
        regs.mar = regs.pc;
        regs.mdr = self.memory.read(regs.mar);
        regs.pc = regs.pc.wrapping_add(1);
        regs.ir = regs.mdr;
    }

    fn decode(&mut self) {
        self.decoded = Decoded::new(self.registers.ir);
        match self.decoded.opcode {
            Opcode::Rti | Opcode::Reserved | Opcode::Trap => {
                log::warn!(
                    "x{:04X}: {} x{:04X} is not supported, treating as a no-op",
                    self.registers.mar,
                    self.decoded.opcode,
                    self.registers.ir
                );
            }
            _ => {}
        }
    }

    fn evaluate_address(&mut self) {
        let regs = &mut self.registers;
        let d = &mut self.decoded;
        match d.opcode {
            Opcode::Br | Opcode::Lea | Opcode::St | Opcode::Sti => {
                d.address = regs.pc.wrapping_add(d.offset9);
            }
            Opcode::Ld => {
                d.address = regs.pc.wrapping_add(d.offset9);
                regs.mar = d.address;
            }
            Opcode::Ldi => {
                regs.mar = regs.pc.wrapping_add(d.offset9);
                d.address = self.memory.read(regs.mar);
                regs.mar = d.address;
            }
            Opcode::Ldr => {
                d.address = regs.reg(d.sr1).wrapping_add(d.offset6);
                regs.mar = d.address;
            }
            Opcode::Str => d.address = regs.reg(d.sr1).wrapping_add(d.offset6),
            Opcode::Jsr if d.long => d.address = regs.pc.wrapping_add(d.offset11),
            // JSRR, JMP and RET (JMP R7)
            Opcode::Jsr | Opcode::Jmp => d.address = regs.reg(d.sr1),
            Opcode::Add
            | Opcode::And
            | Opcode::Not
            | Opcode::Rti
            | Opcode::Reserved
            | Opcode::Trap => {}
        }
    }

    fn fetch_operands(&mut self) {
        let regs = &mut self.registers;
        let d = &mut self.decoded;
        match d.opcode {
            Opcode::Add | Opcode::And => {
                d.a = regs.reg(d.sr1);
                d.b = if d.immediate { d.imm5 } else { regs.reg(d.sr2) };
            }
            Opcode::Not => d.a = regs.reg(d.sr1),
            Opcode::Ld | Opcode::Ldi | Opcode::Ldr => regs.mdr = self.memory.read(regs.mar),
            Opcode::St | Opcode::Sti | Opcode::Str => d.a = regs.reg(d.dr),
            Opcode::Br
            | Opcode::Jsr
            | Opcode::Jmp
            | Opcode::Lea
            | Opcode::Rti
            | Opcode::Reserved
            | Opcode::Trap => {}
        }
    }

    fn execute(&mut self) {
        let d = &mut self.decoded;
        d.result = match d.opcode {
            Opcode::Add => d.a.wrapping_add(d.b),
            Opcode::And => d.a & d.b,
            Opcode::Not => !d.a,
            _ => return,
        };
    }

    fn store(&mut self) {
        let regs = &mut self.registers;
        let d = &self.decoded;
        match d.opcode {
            Opcode::Br => {
                if d.dr & regs.cc.bits() != 0 {
                    regs.pc = d.address;
                }
            }
            Opcode::Add | Opcode::And | Opcode::Not => regs.set_reg_flags(d.dr, d.result),
            Opcode::Ld | Opcode::Ldi | Opcode::Ldr => regs.set_reg_flags(d.dr, regs.mdr),
            // Condition code untouched
            Opcode::Lea => regs.set_reg(d.dr, d.address),
            Opcode::St | Opcode::Str => {
                regs.mar = d.address;
                regs.mdr = d.a;
                self.memory.write(regs.mar, regs.mdr);
            }
            Opcode::Sti => {
                regs.mar = d.address;
                regs.mdr = d.a;
                let target = self.memory.read(regs.mar);
                self.memory.write(target, regs.mdr);
            }
            Opcode::Jsr => {
                regs.set_reg(7, regs.pc);
                regs.pc = d.address;
            }
            Opcode::Jmp => regs.pc = d.address,
            Opcode::Rti | Opcode::Reserved | Opcode::Trap => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn machine(src: &str) -> Machine {
        Machine::from_assembly(assemble(src).unwrap())
    }

    #[test]
    fn sign_extension() {
        #[rustfmt::skip]
        let cases = [
            // (value, bits, expected)
            (0x000F, 5, 0x000F),
            (0x0010, 5, 0xFFF0),
            (0x001F, 5, 0xFFFF),
            (0xFFE5, 5, 0x0005),
            (0x0020, 6, 0xFFE0),
            (0x003F, 6, 0xFFFF),
            (0x00FF, 9, 0x00FF),
            (0x01FC, 9, 0xFFFC),
            (0x0E0F, 9, 0x000F),
            (0x03FF, 11, 0x03FF),
            (0x07FB, 11, 0xFFFB),
            (0x4800, 11, 0x0000),
        ];
        for (value, bits, expected) in cases {
            assert_eq!(
                sign_extend(value, bits),
                expected,
                "sign_extend(0x{value:04x}, {bits})"
            );
        }
    }

    #[test]
    fn condition_codes() {
        assert_eq!(CondCode::of(0), CondCode::Z);
        assert_eq!(CondCode::of(1), CondCode::P);
        assert_eq!(CondCode::of(0x7FFF), CondCode::P);
        assert_eq!(CondCode::of(0x8000), CondCode::N);
        assert_eq!(CondCode::of(0xFFFF), CondCode::N);
    }

    #[test]
    fn phase_names() {
        assert_eq!(Phase::EvaluateAddress.to_string(), "Evaluate Address");
        assert_eq!(Phase::FetchOperands.to_string(), "Fetch Operands");
        assert_eq!(Phase::Store.next(), Phase::Fetch);
        assert_eq!(Phase::Halted.next(), Phase::Halted);
    }

    #[test]
    fn fetch_side_effects() {
        let mut m = machine("AND R1,R1,#0\nHALT");
        assert_eq!(m.step(), Phase::Fetch);
        assert_eq!(m.registers.mar, 0x3000);
        assert_eq!(m.registers.mdr, 0x5260);
        assert_eq!(m.registers.ir, 0x5260);
        assert_eq!(m.registers.pc, 0x3001);
        assert_eq!(m.next_phase(), Phase::Decode);
    }

    #[test]
    fn three_cycles_to_halt() {
        let mut m = machine("ORG 0x3000\nAND R1,R1,#0\nADD R1,R1,#5\nHALT\nEND");
        let phases: Vec<Phase> = (0..6).map(|_| m.step()).collect();
        assert_eq!(
            phases,
            [
                Phase::Fetch,
                Phase::Decode,
                Phase::EvaluateAddress,
                Phase::FetchOperands,
                Phase::Execute,
                Phase::Store
            ]
        );
        assert_eq!(m.registers.reg(1), 0);
        assert_eq!(m.registers.cc, CondCode::Z);

        assert_eq!(m.run_cycle(), Phase::Store);
        assert_eq!(m.registers.reg(1), 5);
        assert_eq!(m.registers.cc, CondCode::P);
        assert!(!m.is_halted());

        assert_eq!(m.step(), Phase::Halted);
        assert!(m.is_halted());
        assert_eq!(m.registers.ir, HALT_WORD);
        assert_eq!(m.registers.pc, 0x3003);
    }

    #[test]
    fn run_counts_cycles() {
        let mut m = machine("AND R1,R1,#0\nADD R1,R1,#5\nHALT");
        assert_eq!(m.run(100), 3);
        assert_eq!(m.registers.reg(1), 5);
        assert!(m.is_halted());
        assert_eq!(m.run(100), 0);
    }

    #[test]
    fn halted_is_terminal() {
        let mut m = machine("HALT\nADD R1,R1,#1");
        assert_eq!(m.step(), Phase::Halted);
        let (registers, memory) = (m.registers.clone(), m.memory.clone());
        for _ in 0..10 {
            assert_eq!(m.step(), Phase::Halted);
        }
        assert_eq!(m.registers, registers);
        assert_eq!(m.memory, memory);
    }

    #[test]
    fn branch_target_is_label() {
        let src = "ADD R0,R0,#-1\nBRn TARGET\nADD R1,R1,#1\nTARGET, HALT";
        let asm = assemble(src).unwrap();
        let target = asm.symbols.get("TARGET").unwrap();
        let mut m = Machine::from_assembly(asm);
        m.run_cycle();
        assert_eq!(m.registers.cc, CondCode::N);

        m.step();
        m.step();
        assert_eq!(m.registers.pc, 0x3002);
        assert_eq!(m.step(), Phase::EvaluateAddress);
        assert_eq!(m.decoded().address, target);
        m.run_cycle();
        assert_eq!(m.registers.pc, target);
        assert_eq!(m.run(10), 1);
        assert_eq!(m.registers.reg(1), 0);
    }

    #[test]
    fn branch_not_taken() {
        let mut m = machine("BRnp SKIP\nADD R1,R1,#1\nSKIP, HALT");
        m.run(10);
        assert_eq!(m.registers.reg(1), 1);
        assert_eq!(m.registers.cc, CondCode::P);
    }

    #[test]
    fn unconditional_branch_never_taken() {
        // No condition letters means no flag can match
        let mut m = machine("BR SKIP\nADD R1,R1,#2\nSKIP, HALT");
        m.run(10);
        assert_eq!(m.registers.reg(1), 2);
    }

    #[test]
    fn register_alu() {
        let mut m = machine("ADD R1,R1,#7\nADD R2,R2,#12\nAND R3,R1,R2\nADD R4,R1,R2\nNOT R5,R1\nHALT");
        m.run(10);
        assert_eq!(m.registers.reg(3), 4);
        assert_eq!(m.registers.reg(4), 19);
        assert_eq!(m.registers.reg(5), !7);
        assert_eq!(m.registers.cc, CondCode::N);
    }

    #[test]
    fn lea_leaves_condition_code() {
        let mut m = machine("ADD R0,R0,#-1\nLEA R1, X\nX, HALT");
        m.run(10);
        assert_eq!(m.registers.reg(1), 0x3002);
        assert_eq!(m.registers.cc, CondCode::N);
    }

    #[test]
    fn base_offset_memory() {
        let src = "LEA R6, DATA\nLDR R0, R6, #1\nSTR R0, R6, #-1\nHALT\nSLOT, DEC 0\nDATA, DEC 0\nDEC -9";
        let mut m = machine(src);
        m.run(10);
        assert_eq!(m.registers.reg(0), 0xFFF7);
        assert_eq!(m.registers.cc, CondCode::N);
        assert_eq!(m.memory.read(0x3004), 0xFFF7);
    }

    #[test]
    fn indirect_and_subroutine() {
        let src = include_str!("../tests/files/subroutine.asm");
        let mut m = machine(src);
        assert_eq!(m.run(100), 8);
        assert_eq!(m.registers.reg(0), 42);
        assert_eq!(m.registers.reg(3), 0x3008);
        assert_eq!(m.registers.reg(4), 0x3010);
        assert_eq!(m.registers.reg(7), 0x3002);
        assert_eq!(m.memory.read(0x3010), 42);
        // The pointer itself is untouched
        assert_eq!(m.memory.read(0x3008), 0x3010);
    }

    #[test]
    fn register_jumps() {
        let mut m = machine(include_str!("../tests/files/jumps.asm"));
        assert_eq!(m.run(100), 7);
        assert!(m.is_halted());
        assert_eq!(m.registers.reg(4), 9);
        // Jumped over by JMP R3
        assert_eq!(m.registers.reg(5), 0);
        // JSRR links to the instruction after itself
        assert_eq!(m.registers.reg(7), 0x3002);
        assert_eq!(m.registers.pc, 0x3006);
    }

    #[test]
    fn jsrr_reads_base_before_linking() {
        // R7 is both base and link register
        let mut m = machine("LEA R7, SUB\nJSRR R7\nHALT\nSUB, HALT");
        m.run_cycle();
        m.run_cycle();
        assert_eq!(m.registers.pc, 0x3003);
        assert_eq!(m.registers.reg(7), 0x3002);
    }

    #[test]
    fn ldi_dereferences_at_evaluate_address() {
        let mut m = machine("LDI R0, PTR\nHALT\nPTR, HEX 3005\nORG 3005\nDEC 77");
        for _ in 0..3 {
            m.step();
        }
        assert_eq!(m.registers.mar, 0x3005);
        m.run_cycle();
        assert_eq!(m.registers.mdr, 77);
        assert_eq!(m.registers.reg(0), 77);
    }

    #[test]
    fn sum_sample() {
        let mut m = machine(include_str!("../tests/files/sum.asm"));
        m.run(1000);
        assert!(m.is_halted());
        assert_eq!(m.registers.reg(1), 6);
        assert_eq!(m.memory.read(0x300A), 6);
    }

    #[test]
    fn unsupported_opcodes_are_no_ops() {
        let mut memory = Memory::new();
        memory.write(0x3000, 0xD000);
        memory.write(0x3001, 0x8000);
        memory.write(0x3002, 0xF020);
        memory.write(0x3003, HALT_WORD);
        let mut m = Machine::new(memory, 0x3000);
        assert_eq!(m.run(10), 4);
        assert_eq!(m.registers.gpr, [0; 8]);
        assert_eq!(m.registers.cc, CondCode::Z);
    }

    #[test]
    fn run_limit() {
        let mut m = machine("LOOP, BRnzp LOOP");
        assert_eq!(m.run(10), 10);
        assert!(!m.is_halted());
        assert_eq!(m.registers.pc, 0x3000);
    }

    #[test]
    fn reset_restarts_at_origin() {
        let mut m = machine("ADD R1,R1,#3\nST R1, OUT\nHALT\nOUT, DEC 0");
        m.run(10);
        assert!(m.is_halted());
        m.reset();
        assert!(!m.is_halted());
        assert_eq!(m.registers, Registers::new(0x3000));
        assert_eq!(m.memory.read(0x3003), 3);
        m.run(10);
        assert_eq!(m.registers.reg(1), 3);
    }

    #[test]
    fn register_display() {
        let mut regs = Registers::new(0x3000);
        regs.set_reg(1, 5);
        regs.cc = CondCode::P;
        let text = regs.to_string();
        assert!(text.starts_with("R0 x0000  R1 x0005  R2 x0000  R3 x0000\n"));
        assert!(text.contains("R7 x0000\nPC x3000"));
        assert!(text.ends_with("N 0  Z 0  P 1"));
    }
}
