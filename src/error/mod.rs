//! Error types for all pipeline phases.

use crate::span::Span;
use thiserror::Error;

/// Parser errors. The parser collects these into a list rather than
/// aborting on the first one; `Engine::prepare` reports them joined.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Illegal character '{0}' at {1}")]
    IllegalCharacter(char, Span),

    #[error("Unexpected end of script at {0}")]
    UnexpectedEof(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::IllegalCharacter(_, span) => *span,
            Self::UnexpectedEof(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Too many constants in one program (limit 65536)")]
    TooManyConstants,

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }
}

/// Errors raised while a compiled program executes.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Unknown opcode {0:#04x} at offset {1}")]
    UnknownOpcode(u8, usize),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegexp { pattern: String, message: String },

    #[error("Type error: {0}")]
    TypeMismatch(String),

    #[error("{0}")]
    General(String),
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }
}

/// A unified error type covering every phase, from lexing to execution.
#[derive(Debug, Error)]
pub enum SiftError {
    /// One or more parse errors, already joined with newlines.
    #[error("Errors parsing script:\n{0}")]
    Parse(String),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Script has not been prepared")]
    NotPrepared,
}

impl SiftError {
    /// Build a `Parse` error from the parser's collected error list.
    pub fn from_parse_errors(errors: &[ParserError]) -> Self {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self::Parse(joined)
    }
}
