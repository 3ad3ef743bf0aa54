//! Single-pass tokenizer (spec.md §4.1).
//!
//! Classifies each character, maintains a growing buffer that flushes on a
//! class change, and drops comments. Parens, `;`, `,`, `:`, `.` are always
//! single-character tokens. Strings are lexed as a single `StringLiteral`
//! between `"`...`"`.

use crate::position::SourcePosition;
use crate::token::{Token, is_alphanumeric, is_comment_start, is_paren, is_special};

pub struct Tokenizer {
    tokens: Vec<Token>,
    buffer: String,
    buffer_is_alphanumeric: bool,
    buffer_start: SourcePosition,
    line: usize,
    column: usize,
}

impl Tokenizer {
    /// Tokenizes `source` in one pass.
    #[must_use]
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut tokenizer = Self {
            tokens: Vec::new(),
            buffer: String::new(),
            buffer_is_alphanumeric: true,
            buffer_start: SourcePosition::default(),
            line: 0,
            column: 0,
        };
        tokenizer.run(source);
        tokenizer.tokens
    }

    fn run(&mut self, source: &str) {
        let mut in_comment = false;
        let mut in_string = false;
        let mut string_buffer = String::new();
        let mut string_start = SourcePosition::default();

        for c in source.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }

            if in_string {
                if c == '"' {
                    self.tokens.push(Token::new_string_literal(std::mem::take(&mut string_buffer), string_start));
                    in_string = false;
                } else {
                    string_buffer.push(c);
                }
                continue;
            }

            if c == '"' {
                self.flush_buffer();
                in_string = true;
                string_buffer.clear();
                string_start = self.position_before_current();
                continue;
            }

            if is_comment_start(c) {
                in_comment = true;
                continue;
            }

            if in_comment {
                if c == '\n' {
                    in_comment = false;
                }
                continue;
            }

            let is_alnum = is_alphanumeric(c);
            let is_spec = is_special(c);

            if is_paren(c) {
                self.flush_buffer();
                self.tokens.push(Token::new(c.to_string(), self.position_before_current()));
                continue;
            }

            if !is_spec && !is_alnum {
                // Whitespace or any other separator.
                self.flush_buffer();
                continue;
            }

            if self.buffer.is_empty() {
                self.buffer_start = self.position_before_current();
                self.buffer.push(c);
                self.buffer_is_alphanumeric = is_alnum;
                continue;
            }

            if (self.buffer_is_alphanumeric && is_alnum) || (!self.buffer_is_alphanumeric && is_spec) {
                self.buffer.push(c);
            } else {
                self.flush_buffer();
                self.buffer.push(c);
                self.buffer_is_alphanumeric = is_alnum;
            }
        }

        self.flush_buffer();
    }

    /// The position of the character just consumed (`column` has already
    /// been advanced past it).
    fn position_before_current(&self) -> SourcePosition {
        SourcePosition::new(self.line, self.column.saturating_sub(1))
    }

    fn flush_buffer(&mut self) {
        if !self.buffer.is_empty() {
            self.tokens.push(Token::new(std::mem::take(&mut self.buffer), self.buffer_start));
        }
    }
}
