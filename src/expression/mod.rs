//! # Expression engine
//!
//! Conditions and display formats are written in one of two dialects:
//!
//! * legacy comparator, `speed > 100` or `gear ~~ 1;3`
//! * general expression, `[rpm] > [maxrpm] * 0.9 && [gear] != 'N'`
//!
//! ```text
//! expression/
//! ├── condition.rs - legacy comparator
//! ├── parser.rs    - lexer and parser for general expressions
//! ├── eval.rs      - evaluator, builtins and the format collaborator
//! ├── compiled.rs  - dialect selection and ExpressionSlot
//! └── error.rs     - ExpressionError, EvalError
//! ```

pub mod compiled;
pub mod condition;
pub mod error;
pub mod eval;
pub mod parser;

use crate::telemetry::TypedValue;

pub use compiled::{compile, CompiledExpression, Expression, ExpressionSlot};
pub use condition::{ConditionExpression, ConditionOperator};
pub use error::{EvalError, ExpressionError};
pub use eval::{DefaultFormatter, Value, ValueFormatter};
pub use parser::Labels;

/// Resolves a property name to its current value
pub trait PropertyLookup {
    fn lookup(&self, name: &str) -> Option<TypedValue>;
}

impl<F> PropertyLookup for F
where
    F: Fn(&str) -> Option<TypedValue>,
{
    fn lookup(&self, name: &str) -> Option<TypedValue> {
        self(name)
    }
}
