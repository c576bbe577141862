//! Embedded expression language.
//!
//! A small, side-effect-free language evaluated against the current document,
//! used for transform bodies, parameter projections and branch conditions.
//!
//! ```text
//! classificationResult.confidence < 0.7
//! merge(document, {metadata: {classified: true, type: classificationResult.documentType}})
//! documentType == 'INVOICE' ? 'processPayment' : 'createOrder'
//! length(filter(lines, @.amount > 100))
//! ```
//!
//! Expression strings are parsed once into an [`Expr`] when a workflow is
//! validated; evaluation never re-parses.

mod ast;
mod eval;
mod lexer;
mod parser;

use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub use ast::{BinaryOp, Expr, Function, PathBase, UnaryOp};
pub use eval::{EvalError, EvalOptions, Evaluator};

/// A syntax error, with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Parse an expression string.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    parser::parse(source)
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    expr: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate where a value is required; missing fields are errors.
    pub fn evaluate(&self, root: &Value, options: &EvalOptions) -> Result<Value, EvalError> {
        Evaluator::new(root, options).evaluate(&self.expr)
    }

    /// Evaluate in a construction context; a bare missing path yields `null`.
    pub fn evaluate_lenient(
        &self,
        root: &Value,
        options: &EvalOptions,
    ) -> Result<Value, EvalError> {
        Evaluator::new(root, options).evaluate_lenient(&self.expr)
    }

    pub fn evaluate_condition(
        &self,
        root: &Value,
        options: &EvalOptions,
    ) -> Result<bool, EvalError> {
        Evaluator::new(root, options).evaluate_condition(&self.expr)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expression_keeps_source() {
        let expr = Expression::parse("a.b == 1").unwrap();
        assert_eq!(expr.source(), "a.b == 1");
        assert_eq!(expr.to_string(), "a.b == 1");
        assert!(
            expr.evaluate_condition(&json!({"a": {"b": 1}}), &EvalOptions::default())
                .unwrap()
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = Expression::parse("a +").unwrap_err();
        assert!(err.to_string().contains("at offset"), "{err}");
    }
}
