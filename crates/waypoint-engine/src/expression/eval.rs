//! Expression evaluation over a JSON document.
//!
//! Missing fields are an error wherever a value is required (operands,
//! conditions, a top-level expression) and read as `null` in construction
//! contexts (record fields, array elements, `merge`/`coalesce` arguments).
//!
//! Ordering comparisons never fail: a `null`, or any pair that is not two
//! numbers or two strings, simply does not match.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::ast::{BinaryOp, Expr, Function, PathBase, UnaryOp};
use crate::error::{ErrorCategory, Failure};
use crate::path::{PathSegment, render_segments, resolve_segments};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A referenced field does not exist where a value is required.
    #[error("field '{path}' does not exist")]
    MissingField { path: String },

    /// An operator or function received operands of the wrong type.
    #[error("type error: {0}")]
    Type(String),

    /// Any other evaluation fault (division by zero, non-finite result, ...).
    #[error("{0}")]
    Invalid(String),
}

impl From<EvalError> for Failure {
    fn from(err: EvalError) -> Self {
        let category = match err {
            EvalError::Type(_) => ErrorCategory::TypeError,
            EvalError::MissingField { .. } | EvalError::Invalid(_) => {
                ErrorCategory::ExpressionError
            }
        };
        Failure::new(category, err.to_string())
    }
}

/// Evaluation policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOptions {
    /// Value returned instead of raising a type error when an operator is
    /// applied to incompatible operands.
    pub type_fallback: Option<Value>,
}

/// Evaluates expressions against one document root.
pub struct Evaluator<'a> {
    root: &'a Value,
    options: &'a EvalOptions,
}

impl<'a> Evaluator<'a> {
    pub fn new(root: &'a Value, options: &'a EvalOptions) -> Self {
        Self { root, options }
    }

    /// Evaluate in a value-requiring context.
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval(expr, None)
    }

    /// Evaluate in a construction context: a missing path yields `null`.
    pub fn evaluate_lenient(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval_lenient(expr, None)
    }

    /// Evaluate a condition, which must produce a boolean.
    pub fn evaluate_condition(&self, expr: &Expr) -> Result<bool, EvalError> {
        match self.evaluate(expr)? {
            Value::Bool(b) => Ok(b),
            other => match &self.options.type_fallback {
                Some(Value::Bool(b)) => Ok(*b),
                _ => Err(EvalError::Type(format!(
                    "condition must be a boolean, got {}",
                    type_name(&other)
                ))),
            },
        }
    }

    fn eval(&self, expr: &Expr, item: Option<&Value>) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path { base, segments } => {
                self.resolve(base, segments, item)?
                    .ok_or_else(|| EvalError::MissingField {
                        path: describe_path(base, segments),
                    })
            }
            Expr::Record(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), self.eval_lenient(value, item)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Array(items) => items
                .iter()
                .map(|e| self.eval_lenient(e, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Call { function, args } => self.call(*function, args, item),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, item)?;
                self.unary(*op, value)
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right, item),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => match self.eval(condition, item)? {
                Value::Bool(true) => self.eval(then, item),
                Value::Bool(false) => self.eval(otherwise, item),
                other => self.type_error(format!(
                    "conditional test must be a boolean, got {}",
                    type_name(&other)
                )),
            },
        }
    }

    fn eval_lenient(&self, expr: &Expr, item: Option<&Value>) -> Result<Value, EvalError> {
        match expr {
            Expr::Path { base, segments } => Ok(self
                .resolve(base, segments, item)?
                .unwrap_or(Value::Null)),
            other => self.eval(other, item),
        }
    }

    fn resolve(
        &self,
        base: &PathBase,
        segments: &[PathSegment],
        item: Option<&Value>,
    ) -> Result<Option<Value>, EvalError> {
        match base {
            PathBase::Root => Ok(resolve_segments(self.root, segments).cloned()),
            PathBase::Item => {
                let current = item.ok_or_else(|| {
                    EvalError::Invalid("'@' is only available inside filter()".into())
                })?;
                Ok(resolve_segments(current, segments).cloned())
            }
            PathBase::Expr(inner) => {
                let value = self.eval(inner, item)?;
                Ok(resolve_segments(&value, segments).cloned())
            }
        }
    }

    fn type_error(&self, message: String) -> Result<Value, EvalError> {
        match &self.options.type_fallback {
            Some(fallback) => Ok(fallback.clone()),
            None => Err(EvalError::Type(message)),
        }
    }

    fn unary(&self, op: UnaryOp, value: Value) -> Result<Value, EvalError> {
        match (op, value) {
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, Value::Number(n)) => {
                if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                    return Ok(Value::from(i));
                }
                float_value(-n.as_f64().unwrap_or(0.0))
            }
            (UnaryOp::Not, other) => {
                self.type_error(format!("'!' expects a boolean, got {}", type_name(&other)))
            }
            (UnaryOp::Neg, other) => {
                self.type_error(format!("'-' expects a number, got {}", type_name(&other)))
            }
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        item: Option<&Value>,
    ) -> Result<Value, EvalError> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs = match self.eval(left, item)? {
                Value::Bool(b) => b,
                other => return self.logical_type_error(op, &other),
            };
            // Short-circuit.
            if (op == BinaryOp::And && !lhs) || (op == BinaryOp::Or && lhs) {
                return Ok(Value::Bool(lhs));
            }
            return match self.eval(right, item)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => self.logical_type_error(op, &other),
            };
        }

        let lhs = self.eval(left, item)?;
        let rhs = self.eval(right, item)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let matched = compare(&lhs, &rhs).is_some_and(|ordering| match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                });
                Ok(Value::Bool(matched))
            }
            BinaryOp::Add => match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
                _ => self.operand_type_error(op, &lhs, &rhs),
            },
            _ => match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
                _ => self.operand_type_error(op, &lhs, &rhs),
            },
        }
    }

    fn logical_type_error(&self, op: BinaryOp, operand: &Value) -> Result<Value, EvalError> {
        self.type_error(format!(
            "'{}' expects boolean operands, got {}",
            op.symbol(),
            type_name(operand)
        ))
    }

    fn operand_type_error(
        &self,
        op: BinaryOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, EvalError> {
        self.type_error(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            type_name(lhs),
            type_name(rhs)
        ))
    }

    fn call(
        &self,
        function: Function,
        args: &[Expr],
        item: Option<&Value>,
    ) -> Result<Value, EvalError> {
        match function {
            Function::Merge => {
                let mut merged = Map::new();
                for (i, arg) in args.iter().enumerate() {
                    match self.eval_lenient(arg, item)? {
                        Value::Null => {}
                        Value::Object(fields) => merged.extend(fields),
                        other => {
                            return self.type_error(format!(
                                "merge() argument {} must be an object, got {}",
                                i + 1,
                                type_name(&other)
                            ));
                        }
                    }
                }
                Ok(Value::Object(merged))
            }
            Function::Filter => {
                let items = match self.eval(&args[0], item)? {
                    Value::Array(items) => items,
                    other => {
                        return self.type_error(format!(
                            "filter() expects an array, got {}",
                            type_name(&other)
                        ));
                    }
                };
                let mut kept = Vec::new();
                for element in items {
                    match self.eval(&args[1], Some(&element))? {
                        Value::Bool(true) => kept.push(element),
                        Value::Bool(false) => {}
                        other => {
                            return self.type_error(format!(
                                "filter() predicate must be a boolean, got {}",
                                type_name(&other)
                            ));
                        }
                    }
                }
                Ok(Value::Array(kept))
            }
            Function::Length => match self.eval(&args[0], item)? {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(a) => Ok(Value::from(a.len())),
                Value::Object(o) => Ok(Value::from(o.len())),
                other => self.type_error(format!(
                    "length() expects a string, array or object, got {}",
                    type_name(&other)
                )),
            },
            Function::Coalesce => {
                for arg in args {
                    let value = self.eval_lenient(arg, item)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
        }
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> Result<Value, EvalError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if y == 0 && matches!(op, BinaryOp::Div | BinaryOp::Rem) {
            return Err(EvalError::Invalid("division by zero".into()));
        }
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(n) = exact {
            return Ok(Value::from(n));
        }
    }

    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Rem if y == 0.0 => {
            return Err(EvalError::Invalid("division by zero".into()));
        }
        BinaryOp::Div => x / y,
        BinaryOp::Rem => x % y,
        other => {
            return Err(EvalError::Invalid(format!(
                "'{}' is not an arithmetic operator",
                other.symbol()
            )));
        }
    };
    float_value(result)
}

fn float_value(f: f64) -> Result<Value, EvalError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EvalError::Invalid("arithmetic produced a non-finite number".into()))
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Ordering for two numbers or two strings; `None` for anything else.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe_path(base: &PathBase, segments: &[PathSegment]) -> String {
    let rendered = render_segments(segments);
    let prefix = match base {
        PathBase::Root => return rendered,
        PathBase::Item => "@",
        PathBase::Expr(_) => "(expression)",
    };
    match rendered.strip_prefix('$') {
        Some(rest) => format!("{prefix}{rest}"),
        None => format!("{prefix}.{rendered}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse;
    use serde_json::json;

    fn eval_with(source: &str, doc: &Value, options: &EvalOptions) -> Result<Value, EvalError> {
        let expr = parse(source).unwrap();
        Evaluator::new(doc, options).evaluate(&expr)
    }

    fn eval(source: &str, doc: &Value) -> Result<Value, EvalError> {
        eval_with(source, doc, &EvalOptions::default())
    }

    #[test]
    fn test_field_projection() {
        let doc = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(eval("a.b[1].c", &doc).unwrap(), json!("deep"));
        assert_eq!(eval("$", &doc).unwrap(), doc);
    }

    #[test]
    fn test_missing_field_in_value_context() {
        let doc = json!({"a": 1});
        let err = eval("a + missing.x", &doc).unwrap_err();
        assert_eq!(
            err,
            EvalError::MissingField {
                path: "missing.x".into()
            }
        );
        let failure: Failure = err.into();
        assert_eq!(failure.category, ErrorCategory::ExpressionError);
    }

    #[test]
    fn test_missing_field_tolerated_in_construction() {
        let doc = json!({"a": 1});
        assert_eq!(
            eval("{x: a, y: missing}", &doc).unwrap(),
            json!({"x": 1, "y": null})
        );
        assert_eq!(eval("[a, missing]", &doc).unwrap(), json!([1, null]));
    }

    #[test]
    fn test_record_with_literals_and_expressions() {
        let doc = json!({"t": "INVOICE"});
        assert_eq!(
            eval("{metadata: {classified: true, type: t}, n: 1 + 2}", &doc).unwrap(),
            json!({"metadata": {"classified": true, "type": "INVOICE"}, "n": 3})
        );
    }

    #[test]
    fn test_merge_later_wins() {
        let doc = json!({"document": {"id": "d1", "type": "old"}});
        assert_eq!(
            eval(
                "merge(document, {type: 'new'}, {metadata: {classified: true}})",
                &doc
            )
            .unwrap(),
            json!({"id": "d1", "type": "new", "metadata": {"classified": true}})
        );
    }

    #[test]
    fn test_merge_ignores_missing_and_rejects_scalars() {
        let doc = json!({"a": {"x": 1}, "n": 5});
        assert_eq!(eval("merge(a, nothing)", &doc).unwrap(), json!({"x": 1}));
        let err = eval("merge(a, n)", &doc).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    #[test]
    fn test_equality_is_case_sensitive() {
        let doc = json!({"t": "INVOICE"});
        assert_eq!(eval("t == 'INVOICE'", &doc).unwrap(), json!(true));
        assert_eq!(eval("t == 'invoice'", &doc).unwrap(), json!(false));
        assert_eq!(eval("t != 'invoice'", &doc).unwrap(), json!(true));
    }

    #[test]
    fn test_numeric_equality_across_representations() {
        let doc = json!({"n": 1});
        assert_eq!(eval("n == 1.0", &doc).unwrap(), json!(true));
    }

    #[test]
    fn test_numeric_comparison() {
        let doc = json!({"c": 0.94});
        assert_eq!(eval("c < 0.7", &doc).unwrap(), json!(false));
        assert_eq!(eval("c >= 0.94", &doc).unwrap(), json!(true));
        assert_eq!(eval("c > 0.5 && c <= 1", &doc).unwrap(), json!(true));
    }

    #[test]
    fn test_comparison_with_null_or_non_numeric_never_matches() {
        let doc = json!({"n": null, "s": "abc", "x": 3});
        for source in ["n < 1", "n >= 1", "s < 1", "s > 1", "x < 's'", "x >= true"] {
            assert_eq!(eval(source, &doc).unwrap(), json!(false), "{source}");
        }
    }

    #[test]
    fn test_string_ordering_is_bytewise() {
        let doc = json!({});
        assert_eq!(eval("'B' < 'a'", &doc).unwrap(), json!(true));
    }

    #[test]
    fn test_ternary() {
        let doc = json!({"documentType": "INVOICE"});
        let source = "documentType == 'INVOICE' ? 'processPayment' : 'createOrder'";
        assert_eq!(eval(source, &doc).unwrap(), json!("processPayment"));
        let doc = json!({"documentType": "PO"});
        assert_eq!(eval(source, &doc).unwrap(), json!("createOrder"));
    }

    #[test]
    fn test_ternary_requires_boolean() {
        let err = eval("1 ? 'a' : 'b'", &json!({})).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    #[test]
    fn test_arithmetic() {
        let doc = json!({"a": 7, "b": 2});
        assert_eq!(eval("a + b * 3", &doc).unwrap(), json!(13));
        assert_eq!(eval("a / b", &doc).unwrap(), json!(3.5));
        assert_eq!(eval("8 / b", &doc).unwrap(), json!(4));
        assert_eq!(eval("a % b", &doc).unwrap(), json!(1));
        assert_eq!(eval("-a", &doc).unwrap(), json!(-7));
        assert_eq!(eval("'ab' + 'cd'", &doc).unwrap(), json!("abcd"));
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        let doc = json!({"big": i64::MAX});
        let value = eval("big + 1", &doc).unwrap();
        assert!(value.is_f64());
    }

    #[test]
    fn test_min_div_neg_one() {
        let doc = json!({"n": i64::MIN});
        let value = eval("n / -1", &doc).unwrap();
        assert_eq!(value.as_f64(), Some(-(i64::MIN as f64)));
        let value = eval("n % -1", &doc).unwrap();
        assert!(value.is_number());
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval("1 / 0", &json!({})).unwrap_err();
        assert!(matches!(err, EvalError::Invalid(_)));
        let failure: Failure = err.into();
        assert_eq!(failure.category, ErrorCategory::ExpressionError);
    }

    #[test]
    fn test_type_error() {
        let doc = json!({"flag": true, "n": 1});
        let err = eval("flag + n", &doc).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
        let failure: Failure = err.into();
        assert_eq!(failure.category, ErrorCategory::TypeError);
        assert!(eval("n && flag", &doc).is_err());
        assert!(eval("!n", &doc).is_err());
    }

    #[test]
    fn test_type_fallback_overrides_error() {
        let doc = json!({"flag": true, "n": 1});
        let options = EvalOptions {
            type_fallback: Some(json!(0)),
        };
        assert_eq!(eval_with("flag + n", &doc, &options).unwrap(), json!(0));
    }

    #[test]
    fn test_logical_short_circuit() {
        // The right operand would be a missing field; it must not be evaluated.
        let doc = json!({"f": false, "t": true});
        assert_eq!(eval("f && missing", &doc).unwrap(), json!(false));
        assert_eq!(eval("t || missing", &doc).unwrap(), json!(true));
        assert!(eval("t && missing", &doc).is_err());
    }

    #[test]
    fn test_filter() {
        let doc = json!({"lines": [{"amount": 50}, {"amount": 150}, {"amount": 300}]});
        assert_eq!(
            eval("filter(lines, @.amount > 100)", &doc).unwrap(),
            json!([{"amount": 150}, {"amount": 300}])
        );
        assert_eq!(
            eval("length(filter(lines, @.amount > 100))", &doc).unwrap(),
            json!(2)
        );
    }

    #[test]
    fn test_filter_errors() {
        let doc = json!({"lines": [1, 2], "n": 1});
        assert!(matches!(
            eval("filter(n, @ > 1)", &doc).unwrap_err(),
            EvalError::Type(_)
        ));
        assert!(matches!(
            eval("filter(lines, @ + 1)", &doc).unwrap_err(),
            EvalError::Type(_)
        ));
    }

    #[test]
    fn test_item_outside_filter() {
        let err = eval("@.x", &json!({})).unwrap_err();
        assert!(matches!(err, EvalError::Invalid(_)));
    }

    #[test]
    fn test_length() {
        let doc = json!({"s": "héllo", "a": [1, 2, 3], "o": {"k": 1}});
        assert_eq!(eval("length(s)", &doc).unwrap(), json!(5));
        assert_eq!(eval("length(a)", &doc).unwrap(), json!(3));
        assert_eq!(eval("length(o)", &doc).unwrap(), json!(1));
        assert!(eval("length(1)", &doc).is_err());
    }

    #[test]
    fn test_coalesce() {
        let doc = json!({"b": null, "c": "third"});
        assert_eq!(eval("coalesce(a, b, c)", &doc).unwrap(), json!("third"));
        assert_eq!(eval("coalesce(a, b)", &doc).unwrap(), Value::Null);
    }

    #[test]
    fn test_postfix_on_call() {
        let doc = json!({"a": {"x": 1}, "b": {"y": 2}});
        assert_eq!(eval("merge(a, b).y", &doc).unwrap(), json!(2));
    }

    #[test]
    fn test_evaluate_condition() {
        let doc = json!({"c": 0.5, "s": "x"});
        let options = EvalOptions::default();
        let evaluator = Evaluator::new(&doc, &options);
        assert!(
            evaluator
                .evaluate_condition(&parse("c < 0.7").unwrap())
                .unwrap()
        );
        assert!(matches!(
            evaluator.evaluate_condition(&parse("s").unwrap()),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_evaluate_lenient_top_level() {
        let doc = json!({});
        let options = EvalOptions::default();
        let evaluator = Evaluator::new(&doc, &options);
        assert_eq!(
            evaluator.evaluate_lenient(&parse("absent.path").unwrap()),
            Ok(Value::Null)
        );
        assert!(evaluator.evaluate(&parse("absent.path").unwrap()).is_err());
    }
}
