use std::{fs::File, ops::RangeInclusive, path::Path};

use crate::{
    encode::encode_word,
    error::{AsmError, ImageError},
    image::{self, Memory},
    lexer,
    symbol::{self, Statements, SymbolTable, DEFAULT_ORIGIN},
    validate::validate,
};

/// Knobs shared by both passes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AsmOptions {
    /// Cursor value before any `ORG` is seen.
    pub origin: u16,
}

impl Default for AsmOptions {
    fn default() -> Self {
        AsmOptions {
            origin: DEFAULT_ORIGIN,
        }
    }
}

/// A line that was reported and skipped.
#[derive(Debug, PartialEq)]
pub struct Diagnostic {
    /// One-based line number.
    pub line: usize,
    pub source: String,
    pub error: AsmError,
}

/// Result of a successful assembly. Skipped lines do not make an assembly fail, they are
/// listed in `diagnostics` instead.
#[derive(Debug)]
pub struct Assembly {
    pub memory: Memory,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
    /// Address of the first word emitted, which is where execution should start.
    pub origin: u16,
    /// Lowest to highest address written, `None` if nothing was emitted.
    pub span: Option<RangeInclusive<u16>>,
}

impl Assembly {
    /// True if every line made it into the image.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Words in the persisted range.
    pub fn image(&self) -> Vec<u16> {
        self.span
            .clone()
            .map(|span| self.memory.words(span))
            .unwrap_or_default()
    }

    /// Persist the written range. Nothing emitted still produces an (empty) file.
    pub fn save(&self, path: &Path) -> Result<usize, ImageError> {
        match &self.span {
            Some(span) => image::save(path, &self.memory, *span.start(), *span.end()),
            None => {
                File::create(path)?;
                Ok(0)
            }
        }
    }
}

/// Two-pass assembler.
#[derive(Clone, Copy, Default, Debug)]
pub struct Assembler {
    options: AsmOptions,
}

impl Assembler {
    pub fn new(options: AsmOptions) -> Self {
        Assembler { options }
    }

    /// Assemble `src` into a fresh memory image.
    ///
    /// Only an empty source fails outright. Anything wrong with an individual line is logged,
    /// recorded as a [`Diagnostic`] and the line skipped, leaving its word zero.
    pub fn assemble(&self, src: &str) -> Result<Assembly, AsmError> {
        if src.trim().is_empty() {
            return Err(AsmError::EmptySource);
        }
        let lines: Vec<&str> = src.lines().collect();
        let diagnostic = |line: usize, error: AsmError| Diagnostic {
            line,
            source: lines.get(line - 1).map(|text| text.trim().to_string()).unwrap_or_default(),
            error,
        };

        let mut problems = Vec::new();
        let symbols = symbol::first_pass(src, self.options.origin, &mut problems);
        log::debug!("first pass resolved {} labels", symbols.len());
        let mut diagnostics: Vec<Diagnostic> = problems
            .into_iter()
            .map(|(line, error)| diagnostic(line, error))
            .collect();

        let mut memory = Memory::new();
        let mut first = None;
        let mut bounds: Option<(u16, u16)> = None;

        for stmt in Statements::new(src, self.options.origin) {
            // Origins were already reported by the first pass
            let Some(code) = stmt.kind.code() else {
                continue;
            };
            let tokens = lexer::operands(code);
            let word = validate(&tokens, &symbols)
                .and_then(|()| encode_word(&tokens, &symbols, stmt.addr));
            match word {
                Ok(word) => {
                    log::debug!("x{:04X}: x{word:04X}  {code}", stmt.addr);
                    memory.write(stmt.addr, word);
                    first = first.or(Some(stmt.addr));
                    bounds = Some(match bounds {
                        Some((lo, hi)) => (lo.min(stmt.addr), hi.max(stmt.addr)),
                        None => (stmt.addr, stmt.addr),
                    });
                }
                Err(error) => {
                    log::warn!("line {}: {error}, skipping `{}`", stmt.line, code.trim());
                    diagnostics.push(diagnostic(stmt.line, error));
                }
            }
        }
        diagnostics.sort_by_key(|diag| diag.line);

        Ok(Assembly {
            memory,
            symbols,
            diagnostics,
            origin: first.unwrap_or(self.options.origin),
            span: bounds.map(|(lo, hi)| lo..=hi),
        })
    }
}

/// Assemble with default options.
pub fn assemble(src: &str) -> Result<Assembly, AsmError> {
    Assembler::default().assemble(src)
}
