//! Line-oriented tokenizer.
//!
//! Source is processed one line at a time. Each line is first classified (blank, comment,
//! directive, label, instruction), then the instruction part is split into operand tokens.

/// Starts a comment running to the end of the line.
pub const COMMENT: char = ';';
/// Terminates a label definition, as in `LOOP, ADD R1,R1,#1`.
pub const LABEL_TERMINATOR: char = ',';
/// Sets the address cursor.
pub const ORIGIN_DIRECTIVE: &str = "ORG";
/// Stops scanning the source.
pub const END_DIRECTIVE: &str = "END";

/// Shape of a single source line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LineKind<'a> {
    /// Empty or whitespace only.
    Blank,
    /// First non-space character is the comment marker.
    Comment,
    /// `ORG <address>`, operand may be missing.
    Origin(Option<&'a str>),
    /// `NAME,` optionally followed by an instruction on the same line.
    Label {
        name: &'a str,
        inline: Option<&'a str>,
    },
    /// Anything else, comment removed.
    Instruction(&'a str),
    /// `END`
    End,
}

/// Remove a trailing comment, if any.
pub fn strip_comment(line: &str) -> &str {
    match line.find(COMMENT) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Tokens of an instruction, in left to right operand order.
///
/// Commas separate operands just like whitespace does, so `ADD R1,R1,#5` and `ADD R1, R1, #5`
/// produce the same four tokens.
pub fn operands(instr: &str) -> Vec<&str> {
    strip_comment(instr)
        .split(|c: char| c.is_whitespace() || c == LABEL_TERMINATOR)
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Classify a line. Both assembler passes go through here, so they agree on which lines occupy
/// an address.
pub fn classify(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with(COMMENT) {
        return LineKind::Comment;
    }

    let code = strip_comment(trimmed).trim_end();
    let first = match code.split_whitespace().next() {
        Some(word) => word,
        None => return LineKind::Blank,
    };
    let rest = code[first.len()..].trim();

    if first == ORIGIN_DIRECTIVE {
        LineKind::Origin(rest.split_whitespace().next())
    } else if first == END_DIRECTIVE {
        LineKind::End
    } else if let Some(name) = first.strip_suffix(LABEL_TERMINATOR) {
        let inline = (!rest.is_empty()).then_some(rest);
        LineKind::Label { name, inline }
    } else {
        LineKind::Instruction(code)
    }
}
