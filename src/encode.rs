use crate::{
    codec::{self, to_binary},
    error::AsmError,
    symbol::{Mnemonic, Register, SymbolTable, REGISTER_MARKER},
    validate::{BYTE_MAX, WORD_MAX},
};

/// `TRAP x25`
pub const HALT_WORD: u16 = 0xF025;

/// Produce the 16-digit bit string for one instruction sitting at `addr`.
///
/// Expects tokens that already passed [`validate`](crate::validate::validate). Label operands
/// become PC-relative offsets, `label - addr - 1`, and are rejected if they don't fit their
/// field.
pub fn encode(tokens: &[&str], symbols: &SymbolTable, addr: u16) -> Result<String, AsmError> {
    let Some(&first) = tokens.first() else {
        return Err(AsmError::EmptyInstruction);
    };
    let operand = |idx: usize| {
        tokens
            .get(idx)
            .copied()
            .ok_or_else(|| AsmError::OperandCount {
                mnemonic: first.to_string(),
                expected: idx + 1,
                found: tokens.len(),
            })
    };
    let reg = |idx: usize| -> Result<String, AsmError> {
        let r: Register = operand(idx)?.parse()?;
        Ok(to_binary(r.index() as i32, 3))
    };
    let pc_offset = |idx: usize, bits: u32| -> Result<String, AsmError> {
        let name = operand(idx)?;
        let target = symbols
            .get(name)
            .ok_or_else(|| AsmError::UnknownLabel(name.to_string()))?;
        let offset = target as i32 - addr as i32 - 1;
        if !codec::fits_signed(offset, bits) {
            let half = 1 << (bits - 1);
            return Err(AsmError::OffsetOutOfRange {
                value: offset,
                min: -half,
                max: half - 1,
            });
        }
        Ok(to_binary(offset, bits))
    };

    let mnemonic: Mnemonic = first.parse()?;
    let bits = match mnemonic {
        Mnemonic::Add | Mnemonic::And => {
            let opcode = if mnemonic == Mnemonic::Add { "0001" } else { "0101" };
            let last = operand(3)?;
            let src2 = if last.starts_with(REGISTER_MARKER) {
                format!("000{}", reg(3)?)
            } else {
                format!("1{}", to_binary(codec::parse_immediate(last)?, 5))
            };
            format!("{opcode}{}{}{src2}", reg(1)?, reg(2)?)
        }
        Mnemonic::Br(cond) => {
            let nzp = to_binary(cond.bits() as i32, 3);
            format!("0000{nzp}{}", pc_offset(1, 9)?)
        }
        Mnemonic::Jmp => format!("1100000{}000000", reg(1)?),
        Mnemonic::Jsr => format!("01001{}", pc_offset(1, 11)?),
        Mnemonic::Jsrr => format!("0100000{}000000", reg(1)?),
        Mnemonic::Ld => format!("0010{}{}", reg(1)?, pc_offset(2, 9)?),
        Mnemonic::Ldi => format!("1010{}{}", reg(1)?, pc_offset(2, 9)?),
        Mnemonic::Lea => format!("1110{}{}", reg(1)?, pc_offset(2, 9)?),
        Mnemonic::St => format!("0011{}{}", reg(1)?, pc_offset(2, 9)?),
        Mnemonic::Sti => format!("1011{}{}", reg(1)?, pc_offset(2, 9)?),
        Mnemonic::Ldr | Mnemonic::Str => {
            let opcode = if mnemonic == Mnemonic::Ldr { "0110" } else { "0111" };
            let offset = codec::parse_offset(operand(3)?)?;
            format!("{opcode}{}{}{}", reg(1)?, reg(2)?, to_binary(offset, 6))
        }
        Mnemonic::Not => format!("1001{}{}111111", reg(1)?, reg(2)?),
        Mnemonic::Ret => "1100000111000000".to_string(),
        Mnemonic::Halt => to_binary(HALT_WORD as i32, 16),
        Mnemonic::Dec => to_binary(codec::parse_dec_word(operand(1)?)?, 16),
        Mnemonic::Hex => to_binary(codec::parse_hex(operand(1)?)? as i32, 16),
        Mnemonic::Word => to_binary(codec::parse_unsigned(operand(1)?, WORD_MAX)? as i32, 16),
        Mnemonic::Byte => to_binary(codec::parse_unsigned(operand(1)?, BYTE_MAX)? as i32, 16),
        Mnemonic::End => return Err(AsmError::NotEncodable(first.to_string())),
    };
    Ok(bits)
}

/// [`encode`] followed by conversion of the bit string to a word.
pub fn encode_word(tokens: &[&str], symbols: &SymbolTable, addr: u16) -> Result<u16, AsmError> {
    codec::parse_word(&encode(tokens, symbols, addr)?)
}
