//! Core parser struct and token plumbing.
//!
//! The parser pulls tokens from the scanner one at a time (current plus
//! one lookahead); nothing is buffered. Errors are collected into a list
//! rather than aborting the parse, so a caller can report all of them.

use crate::ast::Program;
use crate::error::ParserError;
use crate::lexer::{Scanner, Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

/// The Pratt parser for the filter language.
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    pub(crate) cur: Token,
    pub(crate) peek: Token,
    errors: Vec<ParserError>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut scanner = Scanner::new(source);
        let cur = scanner.scan_token();
        let peek = scanner.scan_token();
        Self {
            scanner,
            cur,
            peek,
            errors: Vec::new(),
        }
    }

    /// Parse a complete program, collecting errors as they occur. The
    /// returned program is only meaningful when `errors()` is empty.
    pub fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        Program::new(statements)
    }

    /// The errors collected so far, in source order.
    pub fn errors(&self) -> &[ParserError] {
        &self.errors
    }

    // ===== Token manipulation =====

    /// Consume the current token and return it.
    pub(crate) fn advance(&mut self) -> Token {
        let next = self.scanner.scan_token();
        let peek = std::mem::replace(&mut self.peek, next);
        std::mem::replace(&mut self.cur, peek)
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.cur.kind == TokenKind::Eof
    }

    /// Compare the current token's kind, ignoring any payload.
    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("{}", kind)))
        }
    }

    /// An error describing the current token, with illegal characters and
    /// premature end-of-input reported specially.
    pub(crate) fn unexpected(&self, expected: &str) -> ParserError {
        match &self.cur.kind {
            TokenKind::Illegal(c) => ParserError::IllegalCharacter(*c, self.cur.span),
            TokenKind::Eof => ParserError::UnexpectedEof(self.cur.span),
            found => ParserError::unexpected_token(expected, format!("{}", found), self.cur.span),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.cur.span
    }

    /// Skip ahead to a likely statement boundary after an error. The
    /// offending token itself is always consumed so the parse makes
    /// progress.
    fn synchronize(&mut self) {
        if self.is_at_end() {
            return;
        }
        let first = self.advance();
        if first.kind == TokenKind::Semicolon {
            return;
        }
        while !self.is_at_end() {
            match self.cur.kind {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RightBrace
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}
