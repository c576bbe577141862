//! Engine configuration.
//!
//! The engine never reads files or process environment itself. Callers build
//! an [`EngineConfig`] (the CLI does so from `waypoint-config`) and pass it in
//! at construction.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::expression::EvalOptions;
use crate::resolver::MissingPathPolicy;

/// Free-form values (region, thresholds, endpoints) handed to every unit.
pub type Environment = BTreeMap<String, Value>;

/// Configuration for an [`crate::ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Steps an execution may take before it crashes with `StepLimitExceeded`.
    pub max_steps: usize,
    /// Bound on a single unit invocation when the state declares none.
    pub unit_timeout: Duration,
    /// Accept workflows whose graph contains loops.
    pub allow_cycles: bool,
    /// Behaviour when an `input_path` does not resolve.
    pub missing_input_path: MissingPathPolicy,
    /// Returned in place of a `TypeError` from expression operators.
    pub type_fallback: Option<Value>,
    pub environment: Arc<Environment>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            unit_timeout: Duration::from_secs(300),
            allow_cycles: true,
            missing_input_path: MissingPathPolicy::Fail,
            type_fallback: None,
            environment: Arc::new(Environment::new()),
        }
    }
}

impl EngineConfig {
    pub(crate) fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            type_fallback: self.type_fallback.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps, 1000);
        assert_eq!(config.unit_timeout, Duration::from_secs(300));
        assert!(config.allow_cycles);
        assert_eq!(config.missing_input_path, MissingPathPolicy::Fail);
        assert!(config.type_fallback.is_none());
        assert!(config.environment.is_empty());
    }

    #[test]
    fn test_eval_options_carry_fallback() {
        let config = EngineConfig {
            type_fallback: Some(Value::Bool(false)),
            ..Default::default()
        };
        assert_eq!(config.eval_options().type_fallback, Some(Value::Bool(false)));
    }
}
