//! Tableau calculation → DAX measure translation
//!
//! Formulas are tokenized, parsed into an AST, and re-emitted as DAX.
//! Anything without a safe DAX counterpart (level-of-detail expressions,
//! table calculations, unmapped functions) fails explicitly instead of
//! producing a plausible but wrong expression.

mod functions;
pub mod parser;
pub mod resolver;
pub mod tokenizer;
mod translator;

pub use parser::{parse_formula, BinaryOp, Expr, FieldRef};
pub use resolver::{FieldResolver, Resolved};
pub use translator::ExpressionTranslator;

use thiserror::Error;

/// Why a single formula could not be translated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("{0}")]
    Unsupported(String),

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("unknown field {0}")]
    UnknownField(String),

    #[error("circular reference between calculations: {0}")]
    CircularReference(String),

    #[error("depends on untranslatable calculation '{0}'")]
    FailedDependency(String),
}

impl TranslateError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        TranslateError::Syntax {
            message: message.into(),
            position,
        }
    }
}
