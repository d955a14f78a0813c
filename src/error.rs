use std::num::ParseIntError;

use miette::Diagnostic;
use thiserror::Error;

/// Everything that can go wrong while turning a source line into a machine word.
///
/// Apart from [`AsmError::EmptySource`], none of these abort an assembly: the offending line is
/// reported and skipped, and the assembler moves on to the next one.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum AsmError {
    #[error("source contains no lines to assemble")]
    #[diagnostic(code(asm::empty_source), help("write some instructions, or load a .asm file"))]
    EmptySource,

    #[error("ORG directive is missing its address")]
    #[diagnostic(code(asm::missing_address), help("try something like `ORG 0x3000`"))]
    MissingAddress,

    #[error("could not convert address `{text}`")]
    #[diagnostic(
        code(asm::bad_address),
        help("addresses are hexadecimal, with or without a 0x prefix")
    )]
    MalformedAddress {
        text: String,
        #[source]
        source: ParseIntError,
    },

    #[error("label `{name}` defined again, previously at x{previous:04X}")]
    #[diagnostic(
        code(asm::duplicate_label),
        severity(Warning),
        help("the later definition wins")
    )]
    DuplicateLabel { name: String, previous: u16 },

    #[error("no address left after xFFFF")]
    #[diagnostic(
        code(asm::address_overflow),
        help("move the code lower with an ORG directive")
    )]
    AddressOverflow,

    #[error("empty instruction")]
    #[diagnostic(code(asm::empty))]
    EmptyInstruction,

    #[error("invalid opcode `{0}`")]
    #[diagnostic(
        code(asm::invalid_opcode),
        help("opcodes are case-sensitive, e.g. `ADD` rather than `add`")
    )]
    InvalidOpcode(String),

    #[error("`{mnemonic}` takes {expected} tokens, found {found}")]
    #[diagnostic(code(asm::operand_count), help("check the operands for this instruction"))]
    OperandCount {
        mnemonic: String,
        expected: usize,
        found: usize,
    },

    #[error("`{0}` is not a register")]
    #[diagnostic(code(asm::invalid_register), help("registers are R0 through R7"))]
    InvalidRegister(String),

    #[error("`{0}` is not an immediate value")]
    #[diagnostic(code(asm::invalid_immediate), help("immediates look like `#-3`"))]
    InvalidImmediate(String),

    #[error("immediate {value} does not fit, expected {min} to {max}")]
    #[diagnostic(code(asm::immediate_range))]
    ImmediateOutOfRange { value: i32, min: i32, max: i32 },

    #[error("offset {value} does not fit, expected {min} to {max}")]
    #[diagnostic(code(asm::offset_range))]
    OffsetOutOfRange { value: i32, min: i32, max: i32 },

    #[error("label `{0}` is never defined")]
    #[diagnostic(code(asm::unknown_label))]
    UnknownLabel(String),

    #[error("invalid {radix} literal `{text}`")]
    #[diagnostic(code(asm::bad_literal))]
    MalformedLiteral {
        text: String,
        radix: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("literal {value} does not fit in a 16-bit word")]
    #[diagnostic(
        code(asm::literal_range),
        help("ranges from -32,768 to 32,767 or 0 to 65,535 are allowed")
    )]
    LiteralOutOfRange { value: i64 },

    #[error("`{0}` has no machine encoding")]
    #[diagnostic(code(asm::not_encodable))]
    NotEncodable(String),

    #[error("failed to convert `{0}` to a machine word")]
    #[diagnostic(code(asm::bad_word), help("this is a bug in the encoder"))]
    MalformedWord(String),
}

/// Failures of the memory image reader/writer.
#[derive(Debug, Error, Diagnostic)]
pub enum ImageError {
    #[error(transparent)]
    #[diagnostic(code(image::io))]
    Io(#[from] std::io::Error),

    #[error("image is {0} bytes long, which is not aligned to 16 bits")]
    #[diagnostic(code(image::misaligned))]
    Misaligned(usize),

    #[error("image of {words} words does not fit in memory starting at x{start:04X}")]
    #[diagnostic(code(image::overflow))]
    Overflow { start: u16, words: usize },
}
