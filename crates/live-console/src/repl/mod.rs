//! Embedded read-eval-print loop.
//!
//! Each console session runs its own [`runner::run_repl`] task with a private
//! [`Namespace`]; every namespace shares the same [`HostHandle`], which is
//! how sessions reach into the live process.

mod editor;
mod eval;
mod highlight;
mod namespace;
mod runner;
mod syntax;
mod value;

use thiserror::Error;

use crate::error::WriteError;

pub use editor::{EditEvent, Key, KeyDecoder, LineEditor};
pub use eval::Evaluator;
pub use namespace::{HostHandle, Namespace};
pub use runner::{BANNER, PROMPT, ReplExit, run_isolated, run_repl};
pub use syntax::{Statement, parse};
pub use value::Value;

/// Failure evaluating one line. Everything except [`EvalError::Output`] is
/// reported to the user and the loop carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },

    #[error("name '{0}' is not defined")]
    Name(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Value(String),

    #[error("{0}")]
    Index(String),

    #[error("{0}")]
    Attribute(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("integer overflow")]
    Overflow,

    #[error("output failed: {0}")]
    Output(#[from] WriteError),
}

impl EvalError {
    /// Short class name shown in front of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::Syntax { .. } => "SyntaxError",
            EvalError::Name(_) => "NameError",
            EvalError::Type(_) => "TypeError",
            EvalError::Value(_) => "ValueError",
            EvalError::Index(_) => "IndexError",
            EvalError::Attribute(_) => "AttributeError",
            EvalError::ZeroDivision => "ZeroDivisionError",
            EvalError::Overflow => "OverflowError",
            EvalError::Output(_) => "OutputError",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::Output(_))
    }
}

/// Failure that ends a REPL run.
#[derive(Error, Debug)]
pub enum ReplError {
    #[error("terminal output failed: {0}")]
    Output(#[from] WriteError),
}
