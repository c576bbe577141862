//! Expression syntax tree.

use serde_json::Value;

use crate::path::PathSegment;

/// A parsed expression. Built once at validation time, evaluated many times.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Field projection from a base value.
    Path {
        base: PathBase,
        segments: Vec<PathSegment>,
    },
    /// `{key: expr, ...}`
    Record(Vec<(String, Expr)>),
    /// `[expr, ...]`
    Array(Vec<Expr>),
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `condition ? then : otherwise`
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// What a path projection starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum PathBase {
    /// The document (`$`, or a bare identifier).
    Root,
    /// The current element inside `filter` (`@`).
    Item,
    /// Any other expression, e.g. `merge(a, b).c`.
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Merge,
    Filter,
    Length,
    Coalesce,
}

impl Function {
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        match name {
            "merge" => Some(Self::Merge),
            "filter" => Some(Self::Filter),
            "length" => Some(Self::Length),
            "coalesce" => Some(Self::Coalesce),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Filter => "filter",
            Self::Length => "length",
            Self::Coalesce => "coalesce",
        }
    }

    /// Accepted argument counts as `(min, max)`.
    pub(crate) fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Merge => (2, None),
            Self::Filter => (2, Some(2)),
            Self::Length => (1, Some(1)),
            Self::Coalesce => (1, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}
