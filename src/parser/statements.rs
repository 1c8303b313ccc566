//! Statement parsing: assignment, while, return, blocks, expression
//! statements.

use crate::ast::{Block, Stmt, StmtKind};
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};
use super::precedence::Precedence;

impl<'a> Parser<'a> {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        if self.check(&TokenKind::Return) {
            self.return_statement()
        } else if self.check(&TokenKind::While) {
            self.while_statement()
        } else if self.is_assignment() {
            self.assign_statement()
        } else {
            self.expression_statement()
        }
    }

    /// `name = value`, but not `name == value`.
    fn is_assignment(&self) -> bool {
        matches!(self.cur.kind, TokenKind::Identifier(_)) && self.peek.kind == TokenKind::Equal
    }

    fn assign_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        let name = match self.advance().kind {
            TokenKind::Identifier(name) => name,
            _ => unreachable!("checked by is_assignment"),
        };
        self.expect(&TokenKind::Equal)?;

        let value = self.expression(Precedence::None)?;
        self.match_token(&TokenKind::Semicolon);
        let span = start_span.merge(&value.span);

        Ok(Stmt::new(StmtKind::Assign { name, value }, span))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Return)?;

        let value = self.expression(Precedence::None)?;
        self.match_token(&TokenKind::Semicolon);
        let span = start_span.merge(&value.span);

        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::While)?;

        // Parentheses are mandatory around the condition.
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression(Precedence::None)?;
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;
        let span = start_span.merge(&body.span);

        Ok(Stmt::new(StmtKind::While { condition, body }, span))
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression(Precedence::None)?;
        self.match_token(&TokenKind::Semicolon);
        let span = expr.span;

        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    /// A `{ ... }` block.
    pub(crate) fn block(&mut self) -> ParseResult<Block> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        let end = self.expect(&TokenKind::RightBrace)?;
        Ok(Block::new(statements, start_span.merge(&end.span)))
    }
}
