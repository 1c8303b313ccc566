//! Operator precedence for Pratt parsing.

use crate::lexer::TokenKind;

/// Precedence levels, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Or = 1,         // ||
    And = 2,        // &&
    Equality = 3,   // == != ~= !~
    Comparison = 4, // < <= > >= in
    Term = 5,       // + -
    Factor = 6,     // * / %
    Power = 7,      // **
    Unary = 8,      // ! - √
    Call = 9,       // f(...) a[...]
}

pub fn get_precedence(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::EqualEqual
        | TokenKind::BangEqual
        | TokenKind::Matches
        | TokenKind::NotMatches => Precedence::Equality,
        TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::In => Precedence::Comparison,
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
        TokenKind::Power => Precedence::Power,
        TokenKind::LeftParen | TokenKind::LeftBracket => Precedence::Call,
        _ => Precedence::None,
    }
}
