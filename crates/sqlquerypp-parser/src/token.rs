// Template token types.
//
// The tokenizer only distinguishes what the compiler needs: opaque SQL text,
// positional placeholders and the pieces of a `combined_result` block header.
// Everything else stays inside `Literal` chunks byte for byte.

use std::fmt;

use sqlquerypp_types::Span;

/// The reserved block keyword.
pub const KEYWORD_COMBINED_RESULT: &str = "combined_result";

/// The keyword separating a block's subquery from its name.
pub const KEYWORD_AS: &str = "AS";

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token discriminant.
    pub kind: TokenKind,
    /// Byte-offset span into the original template.
    pub span: Span,
    /// Line number (1-based) at the start of the token.
    pub line: u32,
    /// Column number (1-based) at the start of the token.
    pub col: u32,
}

impl Token {
    /// The exact template text this token was scanned from.
    #[must_use]
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source
            .get(self.span.start as usize..self.span.end as usize)
            .unwrap_or_default()
    }
}

/// Token discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Opaque SQL text, including whitespace, quotes and comments.
    Literal(String),
    /// `%s`.
    Placeholder,
    /// `combined_result`, only when it opens a block header.
    CombinedResult,
    /// `AS` inside a block header.
    As,
    /// `$name`: a block reference, or the block name in a header.
    BlockName(String),
    /// `{` opening a block body.
    LeftBrace,
    /// `}` closing a block body.
    RightBrace,
    /// `(` opening a block's defining subquery.
    LeftParen,
    /// `)` closing a block's defining subquery.
    RightParen,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Short description for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Literal(text) => {
                let trimmed = text.trim();
                let mut shown: String = trimmed.chars().take(24).collect();
                if shown.len() < trimmed.len() {
                    shown.push_str("...");
                }
                format!("SQL text `{shown}`")
            }
            Self::Placeholder => "placeholder `%s`".to_owned(),
            Self::CombinedResult => format!("keyword `{KEYWORD_COMBINED_RESULT}`"),
            Self::As => format!("keyword `{KEYWORD_AS}`"),
            Self::BlockName(name) => format!("`${name}`"),
            Self::LeftBrace => "`{`".to_owned(),
            Self::RightBrace => "`}`".to_owned(),
            Self::LeftParen => "`(`".to_owned(),
            Self::RightParen => "`)`".to_owned(),
            Self::Eof => "end of template".to_owned(),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Whether `b` may appear inside an identifier.
#[must_use]
pub const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Whether `b` may start an identifier.
#[must_use]
pub const fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}
