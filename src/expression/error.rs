//! Error definitions for compiling and evaluating expressions

use thiserror::Error;

/// Raised when a condition or format string does not compile
///
/// This is the only error of the core that is shown to the user; the
/// previously compiled expression stays in effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Missing property name in condition '{0}'")]
    MissingProperty(String),

    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("Unexpected {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        position: usize,
    },

    #[error("Unexpected end of expression, expected {0}")]
    UnexpectedEnd(String),

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Unterminated property reference starting at position {0}")]
    UnterminatedProperty(usize),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} arguments, got {got}")]
    ArgumentCount {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Expression nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("Expression has more than {0} tokens")]
    TooLong(usize),
}

/// Raised while evaluating a compiled expression
///
/// Never leaves the expression slot: it is logged once and the expression
/// counts as inactive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    #[error("Cannot apply '{op}' to {operand}")]
    InvalidOperand { op: String, operand: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Cannot convert '{value}' to {target}")]
    Conversion { value: String, target: String },

    #[error("Format failed: {0}")]
    Format(String),
}
