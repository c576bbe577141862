//! Wire envelope for unit responses.
//!
//! Units that live outside the process (or are replayed from fixtures) report
//! their outcome as JSON:
//!
//! ```json
//! {"status": "ok", "output": {"documentType": "INVOICE"}}
//! {"status": "error", "error": {"category": "TaskFailed", "cause": "timeout talking to OCR"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Failure;

/// Outcome of one unit invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitResponse {
    Ok {
        #[serde(default)]
        output: Value,
    },
    Error {
        error: Failure,
    },
}

impl UnitResponse {
    pub fn ok(output: Value) -> Self {
        Self::Ok { output }
    }

    pub fn error(error: Failure) -> Self {
        Self::Error { error }
    }

    /// Returns true if the unit reported success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn into_result(self) -> Result<Value, Failure> {
        match self {
            Self::Ok { output } => Ok(output),
            Self::Error { error } => Err(error),
        }
    }
}

impl From<Result<Value, Failure>> for UnitResponse {
    fn from(result: Result<Value, Failure>) -> Self {
        match result {
            Ok(output) => Self::Ok { output },
            Err(error) => Self::Error { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde_json::json;

    #[test]
    fn test_response_ok() {
        let response: UnitResponse = serde_json::from_value(json!({
            "status": "ok",
            "output": {"data": [1, 2, 3]}
        }))
        .unwrap();
        assert!(response.is_ok());
        assert_eq!(response.into_result().unwrap()["data"][0], 1);
    }

    #[test]
    fn test_response_error() {
        let response: UnitResponse = serde_json::from_value(json!({
            "status": "error",
            "error": {"category": "Timeout", "cause": "connection refused"}
        }))
        .unwrap();
        assert!(!response.is_ok());
        let failure = response.into_result().unwrap_err();
        assert_eq!(failure.category, ErrorCategory::Timeout);
        assert_eq!(failure.cause, "connection refused");
    }

    #[test]
    fn test_response_ok_without_output() {
        let response: UnitResponse = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_response_unknown_status_rejected() {
        let result: Result<UnitResponse, _> =
            serde_json::from_value(json!({"status": "pending"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_serialize_shape() {
        let value = serde_json::to_value(UnitResponse::error(Failure::new("Rejected", "bad scan")))
            .unwrap();
        assert_eq!(
            value,
            json!({"status": "error", "error": {"category": "Rejected", "cause": "bad scan"}})
        );
    }
}
