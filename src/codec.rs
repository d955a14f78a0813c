//! Conversions between integers, literal tokens and fixed-width bit strings.

use crate::error::AsmError;

/// Marks an immediate operand, as in `#-3`.
pub const IMMEDIATE_MARKER: char = '#';

/// Render `value` as exactly `bits` binary digits.
///
/// Non-negative values are zero-extended (and truncated to their low `bits`). Negative values
/// are taken modulo `2^bits` and padded on the left with `1`s, so every bit above the
/// two's-complement value takes the sign.
pub fn to_binary(value: i32, bits: u32) -> String {
    debug_assert!(bits > 0 && bits <= 16);
    let width = bits as usize;
    let mask = (1u32 << bits) - 1;
    if value < 0 {
        let raw = (value + (1 << bits)) as u32 & mask;
        format!("{:1>width$}", format!("{raw:b}"))
    } else {
        format!("{:0width$b}", value as u32 & mask)
    }
}

/// Read a string of `0`/`1` digits back into a machine word.
pub fn parse_word(bits: &str) -> Result<u16, AsmError> {
    if bits.is_empty() || bits.len() > 16 {
        return Err(AsmError::MalformedWord(bits.to_string()));
    }
    u16::from_str_radix(bits, 2).map_err(|_| AsmError::MalformedWord(bits.to_string()))
}

/// Hexadecimal literal, with an optional `0x` or `x` prefix.
pub fn parse_hex(text: &str) -> Result<u16, AsmError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('x'))
        .or_else(|| text.strip_prefix('X'))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|source| AsmError::MalformedLiteral {
        text: text.to_string(),
        radix: "hexadecimal",
        source,
    })
}

/// Signed decimal literal.
pub fn parse_dec(text: &str) -> Result<i32, AsmError> {
    text.parse::<i32>()
        .map_err(|source| AsmError::MalformedLiteral {
            text: text.to_string(),
            radix: "decimal",
            source,
        })
}

/// Signed decimal literal that must fit in a word, either as `i16` or as `u16`.
pub fn parse_dec_word(text: &str) -> Result<i32, AsmError> {
    let value = parse_dec(text)?;
    if (i16::MIN as i32..=u16::MAX as i32).contains(&value) {
        Ok(value)
    } else {
        Err(AsmError::LiteralOutOfRange {
            value: value as i64,
        })
    }
}

/// Unsigned decimal literal no larger than `max`.
pub fn parse_unsigned(text: &str, max: u16) -> Result<u16, AsmError> {
    let value = text
        .parse::<u32>()
        .map_err(|source| AsmError::MalformedLiteral {
            text: text.to_string(),
            radix: "unsigned decimal",
            source,
        })?;
    if value > max as u32 {
        return Err(AsmError::LiteralOutOfRange {
            value: value as i64,
        });
    }
    Ok(value as u16)
}

/// Immediate operand: the marker followed by a signed decimal.
pub fn parse_immediate(token: &str) -> Result<i32, AsmError> {
    match token.strip_prefix(IMMEDIATE_MARKER) {
        Some(digits) => parse_dec(digits),
        None => Err(AsmError::InvalidImmediate(token.to_string())),
    }
}

/// Base+offset operand. The immediate marker is accepted but not required.
pub fn parse_offset(token: &str) -> Result<i32, AsmError> {
    parse_dec(token.strip_prefix(IMMEDIATE_MARKER).unwrap_or(token))
}

/// Check that `value` fits in a `bits` wide two's-complement field.
pub fn fits_signed(value: i32, bits: u32) -> bool {
    let half = 1i32 << (bits - 1);
    (-half..half).contains(&value)
}
