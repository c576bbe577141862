//! Moving data between the document and a step.
//!
//! Three contracts govern every invoke and transform step:
//!
//! - [`restrict_input`] narrows the document to what the step may see.
//! - [`ParamSpec::project`] builds a fresh object from literals and
//!   expressions evaluated against that input.
//! - [`inject_result`] merges the step's result back into the document.
//!
//! # Parameter syntax
//!
//! Parameters are a JSON object tree. A key ending in `.$` holds an
//! expression string; the key is emitted without the suffix:
//!
//! ```json
//! { "documentId.$": "document.id", "priority": "high" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::document::Document;
use crate::error::Failure;
use crate::expression::{EvalOptions, Expression, ParseError};
use crate::path::Path;

/// Suffix marking an expression-valued parameter key.
pub const EXPRESSION_SUFFIX: &str = ".$";

/// What the step receives when its `input_path` does not resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPathPolicy {
    /// Raise a catchable `PathNotFound` failure.
    #[default]
    Fail,
    /// Hand the step `null`.
    Null,
}

/// Errors found while compiling a parameter tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("parameter '{key}' must hold an expression string")]
    NotAString { key: String },

    #[error("parameter '{key}': {source}")]
    Expression { key: String, source: ParseError },

    #[error("parameter '{key}' is declared twice")]
    Duplicate { key: String },
}

/// A compiled parameter projection.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    Literal(Value),
    Expression(Expression),
    Object(Vec<(String, ParamSpec)>),
    Array(Vec<ParamSpec>),
}

impl ParamSpec {
    /// Compile a raw parameter tree, parsing every `.$` expression.
    pub fn compile(raw: &Value) -> Result<Self, ParamError> {
        compile_at(raw, "")
    }

    /// Build the projected value against `input`.
    pub fn project(&self, input: &Value, options: &EvalOptions) -> Result<Value, Failure> {
        match self {
            ParamSpec::Literal(value) => Ok(value.clone()),
            ParamSpec::Expression(expr) => Ok(expr.evaluate_lenient(input, options)?),
            ParamSpec::Object(fields) => {
                let mut out = Map::new();
                for (key, spec) in fields {
                    out.insert(key.clone(), spec.project(input, options)?);
                }
                Ok(Value::Object(out))
            }
            ParamSpec::Array(items) => items
                .iter()
                .map(|spec| spec.project(input, options))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    /// Every expression in the tree.
    #[cfg(test)]
    pub fn expressions(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_expressions(&mut out);
        out
    }

    #[cfg(test)]
    fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        match self {
            ParamSpec::Literal(_) => {}
            ParamSpec::Expression(expr) => out.push(expr),
            ParamSpec::Object(fields) => {
                for (_, spec) in fields {
                    spec.collect_expressions(out);
                }
            }
            ParamSpec::Array(items) => {
                for spec in items {
                    spec.collect_expressions(out);
                }
            }
        }
    }
}

fn compile_at(raw: &Value, prefix: &str) -> Result<ParamSpec, ParamError> {
    match raw {
        Value::Object(map) => {
            let mut fields: Vec<(String, ParamSpec)> = Vec::with_capacity(map.len());
            for (key, value) in map {
                let (name, spec) = match key.strip_suffix(EXPRESSION_SUFFIX) {
                    Some(name) => {
                        let full = qualify(prefix, name);
                        let source = value
                            .as_str()
                            .ok_or_else(|| ParamError::NotAString { key: full.clone() })?;
                        let expr = Expression::parse(source).map_err(|source| {
                            ParamError::Expression {
                                key: full.clone(),
                                source,
                            }
                        })?;
                        (name.to_string(), ParamSpec::Expression(expr))
                    }
                    None => (key.clone(), compile_at(value, &qualify(prefix, key))?),
                };
                // `a` and `a.$` would both emit `a`.
                if fields.iter().any(|(existing, _)| *existing == name) {
                    return Err(ParamError::Duplicate {
                        key: qualify(prefix, &name),
                    });
                }
                fields.push((name, spec));
            }
            Ok(ParamSpec::Object(fields))
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| compile_at(item, &format!("{prefix}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(ParamSpec::Array),
        literal => Ok(ParamSpec::Literal(literal.clone())),
    }
}

fn qualify(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Narrow the document to `input_path`, or return all of it when unset.
pub fn restrict_input(
    document: &Document,
    input_path: Option<&Path>,
    policy: MissingPathPolicy,
) -> Result<Value, Failure> {
    let Some(path) = input_path else {
        return Ok(document.snapshot());
    };
    match document.get(path) {
        Ok(value) => Ok(value.clone()),
        Err(err) => match policy {
            MissingPathPolicy::Fail => Err(err.into()),
            MissingPathPolicy::Null => Ok(Value::Null),
        },
    }
}

/// Merge `result` into the document at `result_path`.
///
/// At the root this replaces the whole document and every prior field is
/// lost. Workflows only reach this by declaring `result_path = "$"`.
pub fn inject_result(
    document: &mut Document,
    result_path: &Path,
    result: Value,
) -> Result<(), Failure> {
    if result_path.is_root() {
        warn!(
            discarded_fields = ?document.field_names(),
            "Result injected at root, replacing the document"
        );
    }
    document.merge(result_path, result)?;
    Ok(())
}
