//! The error taxonomy: `ParseError`, `TypeError`, `ConstraintViolated` and
//! `Todo`, aggregated into `PipelineError` for the top-level `Runner`.
//!
//! None of these use a derive-macro error crate — the hand-rolled
//! `Display`/`Error`/`From` shape mirrors the teacher's `ReplError` /
//! `ResourceError` (see `repl_error.rs`, `resource.rs` in the teacher
//! crate).

use std::fmt;

use crate::position::SourcePosition;
use crate::token::{Token, TokenKind};

/// Renders a source-pointer line under the faulty position, in the style of
/// the original `generateMarkedCode`/`ParseError::getErrorMessage`: prints
/// the line the position falls on (and the line before, for context) with
/// line numbers, followed by a caret under the offending column.
#[must_use]
pub fn marked_code(position: SourcePosition, source: &str) -> String {
    if source.is_empty() {
        return String::new();
    }

    let target_line = position.line.saturating_sub(1);
    let mut out = String::new();
    let mut line = 0usize;
    let mut chars = source.char_indices().peekable();

    // Seek to the start of `target_line`.
    let mut idx = 0usize;
    while idx < source.len() && line < target_line {
        if let Some((i, c)) = chars.next() {
            idx = i + c.len_utf8();
            if c == '\n' {
                line += 1;
            }
        } else {
            break;
        }
    }

    out.push_str(&format!("{line}:  "));
    while idx < source.len() && line <= position.line {
        let c = source[idx..].chars().next().unwrap();
        out.push(c);
        idx += c.len_utf8();
        if c == '\n' {
            line += 1;
            if line <= position.line {
                out.push_str(&format!("{line}:  "));
            }
        }
    }

    for _ in 0..position.column {
        out.push(' ');
    }
    out.push('^');
    out.push('\n');
    out
}

/// A furthest-reached parse failure: what the parser expected at the
/// deepest point it managed to reach, and what it actually found.
///
/// The parser keeps only the furthest such failure (see
/// `crate::parser::Parser::report`), matching the original's
/// "remember the deepest index" strategy.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub token_index: usize,
    pub expected: String,
    pub message: String,
    pub found: Token,
    pub position: SourcePosition,
}

impl ParseError {
    #[must_use]
    pub fn new(token_index: usize, expected: impl Into<String>, message: impl Into<String>, found: Token, position: SourcePosition) -> Self {
        Self { token_index, expected: expected.into(), message: message.into(), found, position }
    }

    /// Renders `Expecting 'X' but found 'Y' @line:col`, plus a marked
    /// source excerpt and the free-form message, when source is available.
    #[must_use]
    pub fn render(&self, source: &str) -> String {
        let found = if self.found.kind() == TokenKind::None { "<eof>".to_owned() } else { self.found.content().to_owned() };
        let mut out = format!("Expecting '{}' but found '{}' @{}", self.expected, found, self.position);

        let marked = marked_code(self.position, source);
        if !marked.is_empty() {
            out.push_str("\n\n");
            out.push_str(&marked);
        }

        if !self.message.is_empty() {
            out.push('\n');
            out.push_str(&self.message);
            out.push('\n');
        }

        out
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(""))
    }
}

impl std::error::Error for ParseError {}

/// A location-annotated message from type-annotation resolution or the
/// inference fixpoint. Passes aggregate these; only the first is surfaced
/// to the caller (spec.md §4.4/§7).
#[derive(Debug, Clone)]
pub struct TypeError {
    pub message: String,
    pub position: SourcePosition,
}

impl TypeError {
    #[must_use]
    pub fn new(message: impl Into<String>, position: SourcePosition) -> Self {
        Self { message: message.into(), position }
    }

    #[must_use]
    pub fn render(&self, source: &str) -> String {
        let mut out = format!("{} @{}", self.message, self.position);
        let marked = marked_code(self.position, source);
        if !marked.is_empty() {
            out.push('\n');
            out.push_str(&marked);
        }
        out
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(""))
    }
}

impl std::error::Error for TypeError {}

/// An internal invariant failure: an AST shape the emitter/VM/FFI bridge
/// should never see. Always fatal; carries the source location in the
/// implementation (`file!()`/`line!()`) that detected it, per spec.md §7.
#[derive(Debug, Clone)]
pub struct ConstraintViolated {
    pub message: String,
    pub site: &'static str,
}

impl ConstraintViolated {
    #[must_use]
    pub fn new(message: impl Into<String>, site: &'static str) -> Self {
        Self { message: message.into(), site }
    }
}

impl fmt::Display for ConstraintViolated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint violated at {}: {}", self.site, self.message)
    }
}

impl std::error::Error for ConstraintViolated {}

/// Raises a [`ConstraintViolated`] tagged with the call site, mirroring the
/// original's `throwConstraintViolated`.
#[macro_export]
macro_rules! constraint_violated {
    ($msg:expr) => {
        return Err($crate::error::ConstraintViolated::new($msg, concat!(file!(), ":", line!())).into())
    };
}

/// An intentionally unimplemented path. Fatal, like `ConstraintViolated`,
/// but distinguished so callers can tell "this should never happen" apart
/// from "this was never built".
#[derive(Debug, Clone)]
pub struct Todo {
    pub message: String,
}

impl Todo {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for Todo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not implemented: {}", self.message)
    }
}

impl std::error::Error for Todo {}

/// Top-level error for the compile/execute pipeline, separating failures by
/// stage exactly like the teacher's `ReplError`.
#[derive(Debug, Clone)]
pub enum PipelineError {
    Parse(ParseError),
    Type(TypeError),
    Constraint(ConstraintViolated),
    Todo(Todo),
    /// The input file was empty (spec.md §8 edge case).
    EmptyInput,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Type(e) => write!(f, "{e}"),
            Self::Constraint(e) => write!(f, "{e}"),
            Self::Todo(e) => write!(f, "{e}"),
            Self::EmptyInput => write!(f, "empty"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ParseError> for PipelineError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<TypeError> for PipelineError {
    fn from(error: TypeError) -> Self {
        Self::Type(error)
    }
}

impl From<ConstraintViolated> for PipelineError {
    fn from(error: ConstraintViolated) -> Self {
        Self::Constraint(error)
    }
}

impl From<Todo> for PipelineError {
    fn from(error: Todo) -> Self {
        Self::Todo(error)
    }
}
