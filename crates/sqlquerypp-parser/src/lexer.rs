// Template tokenizer.
//
// Splits a template into opaque SQL text, `%s` placeholders and the pieces of
// `combined_result (<subquery>) AS $name { <body> }` headers. Quoted strings,
// quoted identifiers and comments are opaque to `$`, braces, parentheses and
// the block keyword, but a `%s` inside them is still a placeholder: a pyformat
// driver binds it there too. Uses memchr to skip through opaque regions.

use memchr::{memchr2, memchr3};
use sqlquerypp_error::{CompileError, Result};
use sqlquerypp_types::Span;

use crate::token::{
    KEYWORD_AS, KEYWORD_COMBINED_RESULT, Token, TokenKind, is_ident_byte, is_ident_start,
};

/// A saved lexer position.
#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    /// Inside `combined_result ( ... )`.
    Subquery,
    /// Inside `AS $name { ... }`.
    Body,
}

/// An open block delimiter. `depth` counts nested, literal delimiters of the
/// same kind so the matching closer can be found.
#[derive(Debug, Clone, Copy)]
struct Scope {
    kind: ScopeKind,
    depth: u32,
    opened: Mark,
}

/// Opaque lexical regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
}

impl Region {
    const fn is_quote(self) -> bool {
        matches!(self, Self::SingleQuote | Self::DoubleQuote | Self::Backtick)
    }
}

/// Template lexer producing the token stream consumed by the parser.
pub struct Lexer<'a> {
    /// The source bytes (UTF-8).
    src: &'a [u8],
    /// Current byte offset into src.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
    tokens: Vec<Token>,
    /// Start of the literal run not yet pushed.
    literal: Option<Mark>,
    /// Open block delimiters, innermost last.
    scopes: Vec<Scope>,
    region: Option<Region>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given template text.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
            literal: None,
            scopes: Vec::new(),
            region: None,
        }
    }

    /// Tokenize the entire template. The returned vector always ends with
    /// [`TokenKind::Eof`].
    ///
    /// # Errors
    ///
    /// [`CompileError::SyntaxError`] for an unterminated block subquery or
    /// body, a malformed block header, or a `$` not followed by a name.
    pub fn tokenize(source: &str) -> Result<Vec<Token>> {
        let mut lexer = Lexer::new(source);
        lexer.run()?;
        Ok(lexer.tokens)
    }

    fn run(&mut self) -> Result<()> {
        while let Some(ch) = self.peek() {
            if let Some(region) = self.region {
                self.lex_region(region);
                continue;
            }
            match ch {
                b'%' => self.lex_percent(),
                b'\'' => self.open_region(Region::SingleQuote, 1),
                b'"' => self.open_region(Region::DoubleQuote, 1),
                b'`' => self.open_region(Region::Backtick, 1),
                b'-' if self.peek_at(1) == Some(b'-') => self.open_region(Region::LineComment, 2),
                b'/' if self.peek_at(1) == Some(b'*') => self.open_region(Region::BlockComment, 2),
                b'$' if !self.continues_word() => self.lex_block_name()?,
                b'(' => self.lex_left_paren(),
                b')' => self.lex_right_paren()?,
                b'{' => self.lex_left_brace(),
                b'}' => self.lex_right_brace(),
                b'c' | b'C' if self.at_word(KEYWORD_COMBINED_RESULT) => self.lex_keyword(),
                _ => self.take_literal(1),
            }
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(scope) = self.scopes.last() {
            let mut detail = match scope.kind {
                ScopeKind::Subquery => {
                    "unterminated combined_result subquery: `(` is never closed".to_owned()
                }
                ScopeKind::Body => {
                    "unterminated combined_result body: `{` is never closed".to_owned()
                }
            };
            if self.region.is_some_and(Region::is_quote) {
                detail.push_str(" (the template ends inside a quoted string)");
            }
            let at = scope.opened;
            return Err(CompileError::syntax(at.pos, at.line, at.col, detail));
        }
        self.flush_literal();
        let end = self.mark();
        self.push(TokenKind::Eof, end);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn advance(&mut self) -> u8 {
        let ch = self.src[self.pos];
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        ch
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            if self.pos >= self.src.len() {
                break;
            }
            self.advance();
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    const fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn push(&mut self, kind: TokenKind, start: Mark) {
        self.tokens.push(Token {
            kind,
            span: Span::new(offset32(start.pos), offset32(self.pos)),
            line: start.line,
            col: start.col,
        });
    }

    fn error_here(&self, detail: &str) -> CompileError {
        CompileError::syntax(self.pos, self.line, self.col, detail)
    }

    /// Consume `n` bytes into the pending literal run.
    fn take_literal(&mut self, n: usize) {
        if self.literal.is_none() {
            self.literal = Some(self.mark());
        }
        self.advance_by(n);
    }

    fn flush_literal(&mut self) {
        if let Some(start) = self.literal.take() {
            if start.pos < self.pos {
                let text = String::from_utf8_lossy(&self.src[start.pos..self.pos]).into_owned();
                self.push(TokenKind::Literal(text), start);
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.advance();
        }
    }

    /// Whether the byte before the cursor belongs to a word, so a `$` here
    /// continues an identifier instead of starting a reference.
    fn continues_word(&self) -> bool {
        self.pos
            .checked_sub(1)
            .and_then(|p| self.src.get(p))
            .is_some_and(|&b| is_ident_byte(b) || b == b'$')
    }

    /// Case-insensitive whole-word match at the cursor.
    fn at_word(&self, word: &str) -> bool {
        let end = self.pos + word.len();
        let Some(candidate) = self.src.get(self.pos..end) else {
            return false;
        };
        candidate.eq_ignore_ascii_case(word.as_bytes())
            && !self.continues_word()
            && !self
                .src
                .get(end)
                .is_some_and(|&b| is_ident_byte(b) || b == b'$')
    }

    // -----------------------------------------------------------------------
    // Tokenizers
    // -----------------------------------------------------------------------

    fn lex_percent(&mut self) {
        match self.peek_at(1) {
            Some(b's') => {
                self.flush_literal();
                let start = self.mark();
                self.advance_by(2);
                self.push(TokenKind::Placeholder, start);
            }
            // `%%` stays a literal pair, for the driver to unescape.
            Some(b'%') => self.take_literal(2),
            _ => self.take_literal(1),
        }
    }

    fn open_region(&mut self, region: Region, opener_len: usize) {
        self.take_literal(opener_len);
        self.region = Some(region);
    }

    /// Scan inside a quote or comment up to the next `%`, escape or closer.
    fn lex_region(&mut self, region: Region) {
        let rest: &'a [u8] = &self.src[self.pos..];
        let hit = match region {
            Region::SingleQuote => memchr3(b'%', b'\'', b'\\', rest),
            Region::DoubleQuote => memchr3(b'%', b'"', b'\\', rest),
            Region::Backtick => memchr2(b'%', b'`', rest),
            Region::LineComment => memchr2(b'%', b'\n', rest),
            Region::BlockComment => memchr2(b'%', b'*', rest),
        };
        let Some(offset) = hit else {
            self.take_literal(rest.len());
            return;
        };
        self.take_literal(offset);
        let Some(ch) = self.peek() else {
            return;
        };
        match (region, ch) {
            (_, b'%') => self.lex_percent(),
            (_, b'\\') => {
                // A backslash escapes the next byte, except a `%`.
                let escaped = self.peek_at(1).is_some_and(|b| b != b'%');
                self.take_literal(if escaped { 2 } else { 1 });
            }
            (Region::LineComment, _) => {
                self.take_literal(1);
                self.region = None;
            }
            (Region::BlockComment, _) => {
                if self.peek_at(1) == Some(b'/') {
                    self.take_literal(2);
                    self.region = None;
                } else {
                    self.take_literal(1);
                }
            }
            (_, quote) => {
                self.take_literal(1);
                // Doubled quote is an escaped quote.
                if self.peek() == Some(quote) {
                    self.take_literal(1);
                } else {
                    self.region = None;
                }
            }
        }
    }

    /// `$name`, as a reference or as the name in a block header.
    fn lex_block_name(&mut self) -> Result<()> {
        if !self.peek_at(1).is_some_and(is_ident_start) {
            return Err(self.error_here("`$` must be followed by a combined_result name"));
        }
        self.flush_literal();
        let start = self.mark();
        self.advance();
        let name_start = self.pos;
        while self.peek().is_some_and(is_ident_byte) {
            self.advance();
        }
        let name = String::from_utf8_lossy(&self.src[name_start..self.pos]).into_owned();
        self.push(TokenKind::BlockName(name), start);
        Ok(())
    }

    /// `combined_result` starts a header only when `(` follows; otherwise it
    /// is ordinary SQL text.
    fn lex_keyword(&mut self) {
        let len = KEYWORD_COMBINED_RESULT.len();
        let mut next = self.pos + len;
        while self.src.get(next).is_some_and(u8::is_ascii_whitespace) {
            next += 1;
        }
        if self.src.get(next) != Some(&b'(') {
            self.take_literal(len);
            return;
        }

        self.flush_literal();
        let keyword = self.mark();
        self.advance_by(len);
        self.push(TokenKind::CombinedResult, keyword);
        self.skip_whitespace();
        let paren = self.mark();
        self.advance();
        self.push(TokenKind::LeftParen, paren);
        self.scopes.push(Scope {
            kind: ScopeKind::Subquery,
            depth: 0,
            opened: paren,
        });
    }

    /// `AS $name {` after the subquery's closing parenthesis.
    fn lex_header_tail(&mut self) -> Result<()> {
        self.skip_whitespace();
        if !self.at_word(KEYWORD_AS) {
            return Err(self.error_here("expected `AS` after the combined_result subquery"));
        }
        let start = self.mark();
        self.advance_by(KEYWORD_AS.len());
        self.push(TokenKind::As, start);

        self.skip_whitespace();
        if self.peek() != Some(b'$') {
            return Err(self.error_here("expected `$name` after `AS` in a combined_result header"));
        }
        self.lex_block_name()?;

        self.skip_whitespace();
        if self.peek() != Some(b'{') {
            return Err(self.error_here("expected `{` to open the combined_result body"));
        }
        let brace = self.mark();
        self.advance();
        self.push(TokenKind::LeftBrace, brace);
        self.scopes.push(Scope {
            kind: ScopeKind::Body,
            depth: 0,
            opened: brace,
        });
        Ok(())
    }

    fn lex_left_paren(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.kind == ScopeKind::Subquery {
                scope.depth += 1;
            }
        }
        self.take_literal(1);
    }

    fn lex_right_paren(&mut self) -> Result<()> {
        match self.scopes.last_mut() {
            Some(scope) if scope.kind == ScopeKind::Subquery && scope.depth == 0 => {
                self.scopes.pop();
                self.flush_literal();
                let start = self.mark();
                self.advance();
                self.push(TokenKind::RightParen, start);
                self.lex_header_tail()
            }
            Some(scope) if scope.kind == ScopeKind::Subquery => {
                scope.depth -= 1;
                self.take_literal(1);
                Ok(())
            }
            _ => {
                self.take_literal(1);
                Ok(())
            }
        }
    }

    fn lex_left_brace(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.kind == ScopeKind::Body {
                scope.depth += 1;
            }
        }
        self.take_literal(1);
    }

    fn lex_right_brace(&mut self) {
        match self.scopes.last_mut() {
            Some(scope) if scope.kind == ScopeKind::Body && scope.depth == 0 => {
                self.scopes.pop();
                self.flush_literal();
                let start = self.mark();
                self.advance();
                self.push(TokenKind::RightBrace, start);
            }
            Some(scope) if scope.kind == ScopeKind::Body => {
                scope.depth -= 1;
                self.take_literal(1);
            }
            _ => self.take_literal(1),
        }
    }
}

fn offset32(pos: usize) -> u32 {
    u32::try_from(pos).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::tokenize(src).expect("template should tokenize")
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    fn lit(text: &str) -> TokenKind {
        TokenKind::Literal(text.to_owned())
    }

    fn syntax_detail(src: &str) -> String {
        match Lexer::tokenize(src) {
            Err(CompileError::SyntaxError { detail, .. }) => detail,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_lex_plain_sql_is_one_literal() {
        assert_eq!(
            kinds("SELECT a, b FROM t WHERE (x > 1)"),
            vec![lit("SELECT a, b FROM t WHERE (x > 1)"), TokenKind::Eof]
        );
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_lex_placeholders() {
        assert_eq!(
            kinds("a = %s AND b = '%s' AND c LIKE 'x%%'"),
            vec![
                lit("a = "),
                TokenKind::Placeholder,
                lit(" AND b = '"),
                TokenKind::Placeholder,
                lit("' AND c LIKE 'x%%'"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_percent_escape_is_not_a_placeholder() {
        assert_eq!(kinds("x %%s y"), vec![lit("x %%s y"), TokenKind::Eof]);
        assert_eq!(kinds("x % 2"), vec![lit("x % 2"), TokenKind::Eof]);
    }

    #[test]
    fn test_lex_block_header() {
        assert_eq!(
            kinds("combined_result (SELECT id FROM t) AS $ids { SELECT 1 }"),
            vec![
                TokenKind::CombinedResult,
                TokenKind::LeftParen,
                lit("SELECT id FROM t"),
                TokenKind::RightParen,
                TokenKind::As,
                TokenKind::BlockName("ids".to_owned()),
                TokenKind::LeftBrace,
                lit(" SELECT 1 "),
                TokenKind::RightBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_keywords_are_case_insensitive() {
        let tokens = kinds("COMBINED_RESULT(SELECT 1) as $x{SELECT 2}");
        assert_eq!(tokens[0], TokenKind::CombinedResult);
        assert_eq!(tokens[4], TokenKind::As);
        assert_eq!(tokens[5], TokenKind::BlockName("x".to_owned()));
    }

    #[test]
    fn test_lex_keyword_without_paren_is_text() {
        assert_eq!(
            kinds("SELECT combined_result FROM t"),
            vec![lit("SELECT combined_result FROM t"), TokenKind::Eof]
        );
        assert_eq!(
            kinds("SELECT my_combined_result(1)"),
            vec![lit("SELECT my_combined_result(1)"), TokenKind::Eof]
        );
    }

    #[test]
    fn test_lex_references() {
        assert_eq!(
            kinds("WHERE a.id = $ids AND price$x = 1"),
            vec![
                lit("WHERE a.id = "),
                TokenKind::BlockName("ids".to_owned()),
                lit(" AND price$x = 1"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_quotes_and_comments_are_opaque() {
        assert_eq!(
            kinds("SELECT '$x { (' -- $y }\n/* combined_result ( */ `$z` \"}\""),
            vec![
                lit("SELECT '$x { (' -- $y }\n/* combined_result ( */ `$z` \"}\""),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("SELECT 'it''s $x', 'a\\'$y'"),
            vec![lit("SELECT 'it''s $x', 'a\\'$y'"), TokenKind::Eof]
        );
    }

    #[test]
    fn test_lex_placeholder_inside_comment() {
        assert_eq!(
            kinds("SELECT 1 /* %s */"),
            vec![
                lit("SELECT 1 /* "),
                TokenKind::Placeholder,
                lit(" */"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_nested_delimiters_stay_literal() {
        let tokens = kinds(
            "combined_result (SELECT MAX(x) FROM (SELECT 1) s) AS $m { SELECT '{' FROM t WHERE f(a) IN (SELECT 1) AND x = '}' }",
        );
        assert_eq!(tokens[2], lit("SELECT MAX(x) FROM (SELECT 1) s"));
        assert_eq!(
            tokens[7],
            lit(" SELECT '{' FROM t WHERE f(a) IN (SELECT 1) AND x = '}' ")
        );
        assert_eq!(tokens[8], TokenKind::RightBrace);

        let tokens = kinds("combined_result (SELECT 1) AS $m { SELECT '{x}' AS j, {y} }");
        assert_eq!(tokens[7], lit(" SELECT '{x}' AS j, {y} "));
        assert_eq!(tokens[8], TokenKind::RightBrace);
    }

    #[test]
    fn test_lex_nested_header_is_tokenized() {
        let tokens = kinds(
            "combined_result (SELECT 1) AS $a { combined_result (SELECT 2) AS $b { SELECT 3 } }",
        );
        assert_eq!(
            tokens
                .iter()
                .filter(|k| **k == TokenKind::CombinedResult)
                .count(),
            2
        );
    }

    #[test]
    fn test_lex_error_bare_dollar() {
        assert!(syntax_detail("SELECT $ FROM t").contains("must be followed"));
        assert!(syntax_detail("SELECT $1").contains("must be followed"));
    }

    #[test]
    fn test_lex_error_malformed_header() {
        assert!(syntax_detail("combined_result (SELECT 1) $x { }").contains("expected `AS`"));
        assert!(syntax_detail("combined_result (SELECT 1) AS x { }").contains("expected `$name`"));
        assert!(syntax_detail("combined_result (SELECT 1) AS $x SELECT 2").contains("expected `{`"));
    }

    #[test]
    fn test_lex_error_unterminated_block() {
        let err = Lexer::tokenize("SELECT 1;\ncombined_result (SELECT 1) AS $x {\n  SELECT 2")
            .expect_err("unterminated body");
        assert!(matches!(
            err,
            CompileError::SyntaxError { line: 2, col: 34, ref detail, .. }
                if detail.contains("body")
        ));

        assert!(syntax_detail("combined_result (SELECT (1) AS $x {}").contains("subquery"));
        assert!(
            syntax_detail("combined_result (SELECT 1) AS $x { SELECT '}")
                .contains("inside a quoted string")
        );
    }

    #[test]
    fn test_lex_line_column_tracking() {
        let tokens = lex("SELECT\n  %s,\n  $ids");
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
        assert_eq!(tokens[1].kind, TokenKind::Placeholder);
        assert_eq!((tokens[1].line, tokens[1].col), (2, 3));
        assert_eq!(tokens[3].kind, TokenKind::BlockName("ids".to_owned()));
        assert_eq!((tokens[3].line, tokens[3].col), (3, 3));
        assert_eq!(tokens[3].span, Span::new(15, 19));
    }

    #[test]
    fn test_lex_literal_text_round_trips() {
        let src = "SELECT /* c */ 'x' -- t\n FROM \"T\" WHERE a = %s";
        let rebuilt: String = lex(src)
            .iter()
            .map(|t| t.text(src))
            .collect();
        assert_eq!(rebuilt, src);
    }
}
