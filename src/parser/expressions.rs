//! Expression parsing: Pratt precedence climbing, literals, prefix and
//! infix operators, conditionals, calls and indexing.

use crate::ast::{Expr, ExprKind, InfixOp, PrefixOp};
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};
use super::precedence::{get_precedence, Precedence};

impl<'a> Parser<'a> {
    /// Parse an expression binding at least as tightly as `min_prec`.
    pub(crate) fn expression(&mut self, min_prec: Precedence) -> ParseResult<Expr> {
        let mut left = self.prefix_expression()?;

        while get_precedence(&self.cur.kind) > min_prec {
            left = self.infix_expression(left)?;
        }

        Ok(left)
    }

    fn prefix_expression(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();

        match self.cur.kind.clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(n), span))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(n), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), span))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), span))
            }
            TokenKind::Regexp { pattern, flags } => {
                self.advance();
                Ok(Expr::new(ExprKind::Regexp { pattern, flags }, span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), span))
            }
            TokenKind::Bang => self.prefix_operator(PrefixOp::Not),
            TokenKind::Minus => self.prefix_operator(PrefixOp::Negate),
            TokenKind::Root => self.prefix_operator(PrefixOp::Root),
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression(Precedence::None)?;
                self.expect(&TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::LeftBracket => self.array_literal(),
            TokenKind::If => self.if_expression(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn prefix_operator(&mut self, op: PrefixOp) -> ParseResult<Expr> {
        let span = self.current_span();
        self.advance();
        let right = self.expression(Precedence::Unary)?;
        let span = span.merge(&right.span);
        Ok(Expr::new(
            ExprKind::Prefix {
                op,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn array_literal(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LeftBracket)?;

        let mut elements = Vec::new();
        if !self.check(&TokenKind::RightBracket) {
            elements.push(self.expression(Precedence::None)?);
            while self.match_token(&TokenKind::Comma) {
                elements.push(self.expression(Precedence::None)?);
            }
        }

        let end = self.expect(&TokenKind::RightBracket)?;
        Ok(Expr::new(
            ExprKind::Array(elements),
            start_span.merge(&end.span),
        ))
    }

    /// `if (cond) { ... } [else { ... }]`. Parentheses and braces are
    /// mandatory.
    fn if_expression(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        self.expect(&TokenKind::If)?;

        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression(Precedence::None)?;
        self.expect(&TokenKind::RightParen)?;

        let consequence = self.block()?;

        let alternative = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        let end_span = alternative
            .as_ref()
            .map(|block| block.span)
            .unwrap_or(consequence.span);

        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            start_span.merge(&end_span),
        ))
    }

    fn infix_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.cur.kind {
            TokenKind::LeftParen => self.call_expression(left),
            TokenKind::LeftBracket => self.index_expression(left),
            _ => self.binary_expression(left),
        }
    }

    fn binary_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        let op = match self.cur.kind {
            TokenKind::Plus => InfixOp::Add,
            TokenKind::Minus => InfixOp::Subtract,
            TokenKind::Star => InfixOp::Multiply,
            TokenKind::Slash => InfixOp::Divide,
            TokenKind::Percent => InfixOp::Modulo,
            TokenKind::Power => InfixOp::Power,
            TokenKind::Less => InfixOp::Less,
            TokenKind::LessEqual => InfixOp::LessEqual,
            TokenKind::Greater => InfixOp::Greater,
            TokenKind::GreaterEqual => InfixOp::GreaterEqual,
            TokenKind::EqualEqual => InfixOp::Equal,
            TokenKind::BangEqual => InfixOp::NotEqual,
            TokenKind::Matches => InfixOp::Matches,
            TokenKind::NotMatches => InfixOp::NotMatches,
            TokenKind::In => InfixOp::In,
            TokenKind::And => InfixOp::And,
            TokenKind::Or => InfixOp::Or,
            _ => return Err(self.unexpected("an operator")),
        };

        let prec = get_precedence(&self.cur.kind);
        self.advance();
        let right = self.expression(prec)?;
        let span = left.span.merge(&right.span);

        Ok(Expr::new(
            ExprKind::Infix {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        ))
    }

    /// `name(arg, ...)`. Only plain names are callable.
    fn call_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        let start_span = left.span;
        let function = match left.kind {
            ExprKind::Identifier(name) => name,
            _ => {
                return Err(crate::error::ParserError::general(
                    "expected a function name before '('",
                    start_span,
                ))
            }
        };

        self.expect(&TokenKind::LeftParen)?;
        let mut arguments = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            arguments.push(self.expression(Precedence::None)?);
            while self.match_token(&TokenKind::Comma) {
                arguments.push(self.expression(Precedence::None)?);
            }
        }
        let end = self.expect(&TokenKind::RightParen)?;

        Ok(Expr::new(
            ExprKind::Call {
                function,
                arguments,
            },
            start_span.merge(&end.span),
        ))
    }

    fn index_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftBracket)?;
        let index = self.expression(Precedence::None)?;
        let end = self.expect(&TokenKind::RightBracket)?;
        let span = left.span.merge(&end.span);

        Ok(Expr::new(
            ExprKind::Index {
                left: Box::new(left),
                index: Box::new(index),
            },
            span,
        ))
    }
}
