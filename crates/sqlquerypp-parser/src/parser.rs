// Template parser.
//
// Recursive descent over the lexer's token stream, producing the fragment
// tree. Placeholders are numbered in template order and blocks in definition
// order; name resolution happens later in `resolve`.

use sqlquerypp_error::{CompileError, Result};
use sqlquerypp_types::Span;

use crate::fragment::{
    Block, BlockId, Fragment, Literal, Placeholder, Reference, ReferenceId, Template,
};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Parse a template string into its fragment tree.
pub fn parse_template(source: &str) -> Result<Template> {
    Parser::from_template(source)?.parse_template()
}

/// Which closer ends the fragment sequence being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    TopLevel,
    Subquery,
    Body,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    placeholders: usize,
    blocks: usize,
    references: usize,
}

impl Parser {
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            placeholders: 0,
            blocks: 0,
            references: 0,
        }
    }

    pub fn from_template(source: &str) -> Result<Self> {
        Ok(Self::new(Lexer::tokenize(source)?))
    }

    /// Parse the whole token stream.
    pub fn parse_template(&mut self) -> Result<Template> {
        let fragments = self.parse_sequence(Context::TopLevel)?;
        if !self.at_eof() {
            return Err(self.err_unexpected());
        }
        Ok(Template {
            fragments,
            placeholder_count: self.placeholders,
            reference_count: self.references,
        })
    }

    fn parse_sequence(&mut self, context: Context) -> Result<Vec<Fragment>> {
        let mut fragments = Vec::new();
        while let Some(token) = self.current().cloned() {
            match (token.kind, context) {
                (TokenKind::Literal(text), _) => {
                    self.advance();
                    fragments.push(Fragment::Literal(Literal {
                        text,
                        span: token.span,
                    }));
                }
                (TokenKind::Placeholder, _) => {
                    self.advance();
                    fragments.push(Fragment::Placeholder(Placeholder {
                        index: self.placeholders,
                        span: token.span,
                    }));
                    self.placeholders += 1;
                }
                (TokenKind::BlockName(name), _) => {
                    self.advance();
                    fragments.push(Fragment::Reference(Reference {
                        id: ReferenceId(self.references),
                        name,
                        span: token.span,
                    }));
                    self.references += 1;
                }
                (TokenKind::CombinedResult, Context::TopLevel) => {
                    fragments.push(Fragment::Block(self.parse_block()?));
                }
                (TokenKind::CombinedResult, _) => {
                    return Err(self.err_msg(
                        "combined_result blocks cannot be nested inside another block",
                    ));
                }
                (TokenKind::Eof, Context::TopLevel)
                | (TokenKind::RightParen, Context::Subquery)
                | (TokenKind::RightBrace, Context::Body) => break,
                _ => return Err(self.err_unexpected()),
            }
        }
        Ok(fragments)
    }

    /// `combined_result ( <subquery> ) AS $name { <body> }`
    fn parse_block(&mut self) -> Result<Block> {
        let start = self.expect_token(&TokenKind::CombinedResult)?;
        self.expect_token(&TokenKind::LeftParen)?;
        let subquery = self.parse_sequence(Context::Subquery)?;
        self.expect_token(&TokenKind::RightParen)?;
        self.expect_token(&TokenKind::As)?;
        let (name, name_span) = self.expect_block_name()?;

        // The name becomes visible after the header; only the body may use it.
        if let Some(reference) = subquery.iter().find_map(|f| match f {
            Fragment::Reference(r) if r.name == name => Some(r),
            _ => None,
        }) {
            return Err(self.err_at(
                reference.span,
                format!("`${name}` is referenced inside its own defining subquery"),
            ));
        }

        self.expect_token(&TokenKind::LeftBrace)?;
        let body = self.parse_sequence(Context::Body)?;
        let end = self.expect_token(&TokenKind::RightBrace)?;

        let id = BlockId(self.blocks);
        self.blocks += 1;
        Ok(Block {
            id,
            name,
            name_span,
            span: start.merge(end),
            subquery,
            body,
        })
    }

    // -----------------------------------------------------------------------
    // Token navigation
    // -----------------------------------------------------------------------

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> &TokenKind {
        self.current().map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn current_span(&self) -> Span {
        self.current().map_or(Span::ZERO, |t| t.span)
    }

    fn expect_token(&mut self, kind: &TokenKind) -> Result<Span> {
        if self.check(kind) {
            let sp = self.current_span();
            self.advance();
            Ok(sp)
        } else {
            Err(self.err_expected(&kind.describe()))
        }
    }

    fn expect_block_name(&mut self) -> Result<(String, Span)> {
        if let TokenKind::BlockName(name) = self.peek() {
            let name = name.clone();
            let sp = self.current_span();
            self.advance();
            Ok((name, sp))
        } else {
            Err(self.err_expected("a `$name` for the combined_result block"))
        }
    }

    fn err_msg(&self, msg: impl Into<String>) -> CompileError {
        match self.current() {
            Some(t) => CompileError::parse(t.span.offset(), t.line, t.col, msg),
            None => CompileError::parse(0, 0, 0, msg),
        }
    }

    fn err_expected(&self, what: &str) -> CompileError {
        self.err_msg(format!("expected {what}, found {}", self.peek()))
    }

    fn err_unexpected(&self) -> CompileError {
        self.err_msg(format!("unexpected {}", self.peek()))
    }

    /// An error located at the token that produced `span`.
    fn err_at(&self, span: Span, msg: impl Into<String>) -> CompileError {
        match self.tokens.iter().find(|t| t.span == span) {
            Some(t) => CompileError::parse(t.span.offset(), t.line, t.col, msg),
            None => CompileError::parse(span.offset(), 0, 0, msg),
        }
    }
}
