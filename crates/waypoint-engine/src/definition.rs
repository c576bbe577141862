//! Declarative workflow documents.
//!
//! These are the raw, serde-facing types for the workflow file format. They
//! are deliberately loose (paths and expressions are plain strings) so that
//! parsing and validation report separately; [`crate::workflow::Workflow`] is
//! the compiled, validated form the runtime executes.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "document_intake",
//!   "start": "Classify",
//!   "states": {
//!     "Classify": {
//!       "type": "invoke",
//!       "unit": "classify",
//!       "input_path": "document",
//!       "result_path": "classificationResult",
//!       "retry": [{ "errors": ["TaskFailed"], "initial_delay_ms": 2000 }],
//!       "catch": [{ "errors": ["all"], "next": "ManualReview" }],
//!       "next": "CheckConfidence"
//!     },
//!     "CheckConfidence": {
//!       "type": "branch",
//!       "choices": [{ "condition": "classificationResult.confidence < 0.7", "next": "ManualReview" }],
//!       "default": "Done"
//!     },
//!     "ManualReview": { "type": "fail", "error": "NeedsReview", "cause": "low confidence" },
//!     "Done": { "type": "succeed" }
//!   }
//! }
//! ```
//!
//! The same document may be written as TOML (`[states.Classify]` tables).

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Name given to a workflow that declares none and was not loaded from a file.
pub const DEFAULT_WORKFLOW_NAME: &str = "default";

/// A complete workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Name of the first state to run.
    pub start: String,

    /// States in declaration order. Names are unique.
    #[serde(with = "ordered_states")]
    pub states: Vec<(String, StateDefinition)>,
}

/// One node of the graph, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateDefinition {
    Invoke(InvokeDefinition),
    Transform(TransformDefinition),
    Branch(BranchDefinition),
    Succeed(SucceedDefinition),
    Fail(FailDefinition),
}

impl StateDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            StateDefinition::Invoke(_) => "invoke",
            StateDefinition::Transform(_) => "transform",
            StateDefinition::Branch(_) => "branch",
            StateDefinition::Succeed(_) => "succeed",
            StateDefinition::Fail(_) => "fail",
        }
    }
}

/// Calls a registered unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeDefinition {
    /// Registered unit name.
    pub unit: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    /// Where the unit's output lands. Defaults to the state's own name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,

    /// Per-attempt bound. Falls back to the engine's unit timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchDefinition>,

    pub next: String,
}

/// Computes a value from the input without external calls.
///
/// Exactly one of `expression` or `parameters` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,

    /// Accepted by the parser only so validation can reject it by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchDefinition>,

    pub next: String,
}

/// Routes on the first matching condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub choices: Vec<ChoiceDefinition>,

    /// Required; optional here so a missing default is a validation error
    /// rather than a parse error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDefinition {
    pub condition: String,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SucceedDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Failure category reported on the execution.
    pub error: String,

    #[serde(default)]
    pub cause: String,
}

/// Retry policy for one set of failure categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDefinition {
    pub errors: Vec<String>,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Total invocations allowed, counting the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    3
}

/// Reroute for failures that survive retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchDefinition {
    /// Category names, or `"all"`.
    pub errors: Vec<String>,

    /// Where the failure payload lands. Defaults to `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,

    pub next: String,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl WorkflowDefinition {
    /// Parse a workflow document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Parse(format!("JSON: {e}")))
    }

    /// Parse a workflow document from TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| EngineError::Parse(format!("TOML: {e}")))
    }

    /// Load a workflow file. `.toml` files parse as TOML, anything else as
    /// JSON. An unnamed workflow takes the file stem as its name.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let mut definition = if is_toml {
            Self::from_toml(&content)?
        } else {
            Self::from_json(&content)?
        };

        if definition.name.is_none() {
            definition.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        debug!(
            path = %path.display(),
            workflow = definition.name(),
            states = definition.states.len(),
            "Loaded workflow definition"
        );
        Ok(definition)
    }

    /// The workflow's name, or [`DEFAULT_WORKFLOW_NAME`].
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_WORKFLOW_NAME)
    }

    pub fn state(&self, name: &str) -> Option<&StateDefinition> {
        self.states
            .iter()
            .find(|(state_name, _)| state_name == name)
            .map(|(_, state)| state)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Parse(e.to_string()))
    }
}

/// `states` as an ordered list that rejects duplicate names.
mod ordered_states {
    use super::*;

    pub fn serialize<S: Serializer>(
        states: &[(String, StateDefinition)],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(states.len()))?;
        for (name, state) in states {
            map.serialize_entry(name, state)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<(String, StateDefinition)>, D::Error> {
        deserializer.deserialize_map(StatesVisitor)
    }

    struct StatesVisitor;

    impl<'de> Visitor<'de> for StatesVisitor {
        type Value = Vec<(String, StateDefinition)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of state name to state definition")
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut access: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut seen = HashSet::new();
            let mut states = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(name) = access.next_key::<String>()? {
                if !seen.insert(name.clone()) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate state name '{name}'"
                    )));
                }
                let state = access.next_value::<StateDefinition>()?;
                states.push((name, state));
            }
            Ok(states)
        }
    }
}
