//! Error types for the workflow engine.
//!
//! Two layers live here:
//! - [`EngineError`] for engine-level operations (loading, validation,
//!   registration, joining spawned executions).
//! - [`Failure`] for everything that can go wrong *inside* an execution. Every
//!   runtime fault is normalised to a `Failure` with an [`ErrorCategory`] so
//!   that retry and catch rules can match on it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur outside of a running execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed workflow graph, caught before any execution starts.
    #[error("Invalid workflow: {0}")]
    Validation(String),

    /// The workflow document could not be parsed.
    #[error("Failed to parse workflow: {0}")]
    Parse(String),

    /// Failed to read a workflow file.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Workflow not registered with the engine.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A spawned execution task panicked or was aborted.
    #[error("Execution task failed: {0}")]
    Join(String),
}

/// Failure category used by retry and catch matching.
///
/// Serialises as its plain string name (`"TaskFailed"`, `"Timeout"`, ...).
/// Unknown names round-trip through [`ErrorCategory::Custom`], which is how
/// units report their own domain-specific categories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCategory {
    /// Generic unit-of-work invocation failure.
    TaskFailed,
    /// A unit of work exceeded its time bound.
    Timeout,
    /// A path did not resolve in the document.
    PathNotFound,
    /// An expression referenced a missing value or hit an arithmetic fault.
    ExpressionError,
    /// An operator was applied to incompatible operand types.
    TypeError,
    /// A branch had no matching condition and no default.
    NoMatchingBranch,
    /// The execution ran for more steps than the engine allows.
    StepLimitExceeded,
    /// The execution was cancelled before reaching a terminal state.
    Cancelled,
    /// Any other category, typically raised by a unit of work.
    Custom(String),
}

impl ErrorCategory {
    /// The canonical string name of this category.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TaskFailed => "TaskFailed",
            Self::Timeout => "Timeout",
            Self::PathNotFound => "PathNotFound",
            Self::ExpressionError => "ExpressionError",
            Self::TypeError => "TypeError",
            Self::NoMatchingBranch => "NoMatchingBranch",
            Self::StepLimitExceeded => "StepLimitExceeded",
            Self::Cancelled => "Cancelled",
            Self::Custom(name) => name,
        }
    }

    /// Whether retry rules may match this category.
    ///
    /// Only failures reported by units of work are retryable. Evaluator,
    /// resolver and graph faults are deterministic and would fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TaskFailed | Self::Timeout | Self::Custom(_))
    }
}

impl From<String> for ErrorCategory {
    fn from(name: String) -> Self {
        match name.as_str() {
            "TaskFailed" => Self::TaskFailed,
            "Timeout" => Self::Timeout,
            "PathNotFound" => Self::PathNotFound,
            "ExpressionError" => Self::ExpressionError,
            "TypeError" => Self::TypeError,
            "NoMatchingBranch" => Self::NoMatchingBranch,
            "StepLimitExceeded" => Self::StepLimitExceeded,
            "Cancelled" => Self::Cancelled,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for ErrorCategory {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<ErrorCategory> for String {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure raised while executing a step.
///
/// This is also the payload a catch rule injects into the document, and the
/// shape units report on their wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{category}: {cause}")]
pub struct Failure {
    pub category: ErrorCategory,
    pub cause: String,
}

impl Failure {
    pub fn new(category: impl Into<ErrorCategory>, cause: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            cause: cause.into(),
        }
    }

    pub fn task_failed(cause: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TaskFailed, cause)
    }

    pub fn timeout(cause: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, cause)
    }

    /// JSON payload injected by catch rules: `{"category": ..., "cause": ...}`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "category": self.category.as_str(),
            "cause": self.cause,
        })
    }
}
