//! Tokens produced by the [`crate::tokenizer::Tokenizer`].

use std::fmt;

use crate::position::SourcePosition;

/// The kind of a [`Token`], determined once at construction time from the
/// raw lexeme (see `Token::classify`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Special,
    Number,
    StringLiteral,
    Parenthesis,
    /// `;`
    StatementTerminator,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `.`
    Period,
    /// `=`
    Assignment,
    Let,
    Ret,
    If,
    Else,
    While,
    Struct,
    True,
    False,
    /// The `extern` keyword.
    Keyword,
    /// Sentinel returned by out-of-bounds lookahead. Never produced by the
    /// tokenizer itself.
    None,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identifier => "Identifier",
            Self::Special => "Special",
            Self::Number => "Number",
            Self::StringLiteral => "StringLiteral",
            Self::Parenthesis => "Parenthesis",
            Self::StatementTerminator => "StatementTerminator",
            Self::Comma => "Comma",
            Self::Colon => "Colon",
            Self::Period => "Period",
            Self::Assignment => "Assignment",
            Self::Let => "Let",
            Self::Ret => "Ret",
            Self::If => "If",
            Self::Else => "Else",
            Self::While => "While",
            Self::Struct => "Struct",
            Self::True => "True",
            Self::False => "False",
            Self::Keyword => "Keyword",
            Self::None => "None",
        };
        f.write_str(name)
    }
}

/// A single lexeme with its resolved kind and source position.
///
/// Tokens are immutable once constructed; `Tokenizer` assigns the kind by
/// classifying the raw content exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    content: String,
    position: SourcePosition,
}

impl Token {
    /// Builds a token from raw content and classifies it immediately.
    #[must_use]
    pub fn new(content: impl Into<String>, position: SourcePosition) -> Self {
        let content = content.into();
        let kind = Self::classify(&content);
        Self { kind, content, position }
    }

    /// Builds a string-literal token. The tokenizer scans the quoted region
    /// itself and hands us the content with quotes stripped, so this
    /// bypasses the general classifier.
    #[must_use]
    pub fn new_string_literal(content: impl Into<String>, position: SourcePosition) -> Self {
        Self { kind: TokenKind::StringLiteral, content: content.into(), position }
    }

    /// An out-of-range sentinel token, returned by lookahead past the end
    /// of the token stream.
    #[must_use]
    pub fn eof() -> Self {
        Self { kind: TokenKind::None, content: String::new(), position: SourcePosition::default() }
    }

    #[must_use]
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn position(&self) -> SourcePosition {
        self.position
    }

    /// Returns the single character this token consists of, if any.
    #[must_use]
    pub fn as_char(&self) -> Option<char> {
        let mut chars = self.content.chars();
        let first = chars.next()?;
        if chars.next().is_none() { Some(first) } else { None }
    }

    /// Whether this token's content is implied by its kind (keywords,
    /// punctuation) and therefore uninteresting to print alongside the kind.
    #[must_use]
    pub fn has_trivial_content(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::None
                | TokenKind::StatementTerminator
                | TokenKind::Let
                | TokenKind::Ret
                | TokenKind::While
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::Assignment
                | TokenKind::Comma
                | TokenKind::True
                | TokenKind::False
        )
    }

    fn classify(content: &str) -> TokenKind {
        if content.chars().count() == 1 {
            let c = content.chars().next().unwrap();
            if is_paren(c) {
                return TokenKind::Parenthesis;
            }
            if c == ';' {
                return TokenKind::StatementTerminator;
            }
            if c == ',' {
                return TokenKind::Comma;
            }
            if c == ':' {
                return TokenKind::Colon;
            }
            if c == '.' {
                return TokenKind::Period;
            }
        }

        if let Some(keyword) = keyword_kind(content) {
            return keyword;
        }

        if content.chars().all(|c| c.is_ascii_digit()) && !content.is_empty() {
            return TokenKind::Number;
        }

        if content.chars().any(is_special) {
            return TokenKind::Special;
        }

        TokenKind::Identifier
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.has_trivial_content() {
            write!(f, "({})", self.content)?;
        }
        Ok(())
    }
}

/// Exact-match keyword recognition, applied once per flushed buffer.
fn keyword_kind(content: &str) -> Option<TokenKind> {
    Some(match content {
        "=" => TokenKind::Assignment,
        "let" => TokenKind::Let,
        "ret" => TokenKind::Ret,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "struct" => TokenKind::Struct,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "extern" => TokenKind::Keyword,
        _ => return None,
    })
}

/// `[ ] { } ( )` — parens are never special characters.
#[must_use]
pub fn is_paren(c: char) -> bool {
    matches!(c, '[' | ']' | '{' | '}' | '(' | ')')
}

#[must_use]
pub fn is_alphanumeric(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// ASCII punctuation excluding parens; roughly `!..@`, `[.._`, `{..~`.
#[must_use]
pub fn is_special(c: char) -> bool {
    if is_paren(c) {
        return false;
    }
    matches!(c, '!'..='/' | ':'..='@' | '['..='_' | '{'..='~')
}

#[must_use]
pub fn is_comment_start(c: char) -> bool {
    c == '#'
}
