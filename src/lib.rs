// Parsing
mod lexer;
pub use lexer::operands;
mod codec;
pub use codec::{parse_hex, to_binary};
pub mod symbol;
pub use symbol::{SymbolTable, DEFAULT_ORIGIN};
mod validate;
pub use validate::{is_valid, validate};
mod encode;
pub use encode::{encode, encode_word, HALT_WORD};

// Assembling
mod assembler;
pub use assembler::{assemble, AsmOptions, Assembler, Assembly, Diagnostic};
pub mod image;
pub use image::Memory;

// Running
mod runtime;
pub use runtime::{sign_extend, CondCode, Decoded, Machine, Phase, Registers};

mod error;
pub use error::{AsmError, ImageError};

pub mod env;
