//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [engine]          # execution limits and resolution policies
//! [logging]         # log level and optional JSON log directory
//! [environment]     # free-form values handed to units
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every section is optional so that partial layers (a project-local file
/// overriding a single value) can be merged on top of each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSection>,

    /// Values exposed to every unit through its invocation context.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, Value>,
}

impl WaypointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections merge field by field; environment keys are replaced one at a
    /// time.
    pub fn merge(&mut self, other: WaypointConfig) {
        match (&mut self.engine, other.engine) {
            (Some(base), Some(layer)) => base.merge(layer),
            (base @ None, layer) => *base = layer,
            (Some(_), None) => {}
        }

        match (&mut self.logging, other.logging) {
            (Some(base), Some(layer)) => base.merge(layer),
            (base @ None, layer) => *base = layer,
            (Some(_), None) => {}
        }

        self.environment.extend(other.environment);
    }

    /// The engine section, or its defaults when absent.
    pub fn engine(&self) -> EngineSection {
        self.engine.clone().unwrap_or_default()
    }

    /// The logging section, or its defaults when absent.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// What the engine does when an `input_path` names nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingInputPath {
    #[default]
    Fail,
    Null,
}

/// Engine configuration (`[engine]`).
///
/// Unset fields fall back to the engine's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Maximum steps per execution before it crashes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    /// Timeout for invoke states that declare none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_timeout_secs: Option<u64>,
    /// Whether workflows may contain loops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_cycles: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_input_path: Option<MissingInputPath>,
    /// Value produced by expressions that hit a type mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_fallback: Option<Value>,
}

impl EngineSection {
    fn merge(&mut self, other: EngineSection) {
        if other.max_steps.is_some() {
            self.max_steps = other.max_steps;
        }
        if other.unit_timeout_secs.is_some() {
            self.unit_timeout_secs = other.unit_timeout_secs;
        }
        if other.allow_cycles.is_some() {
            self.allow_cycles = other.allow_cycles;
        }
        if other.missing_input_path.is_some() {
            self.missing_input_path = other.missing_input_path;
        }
        if other.type_fallback.is_some() {
            self.type_fallback = other.type_fallback;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration (`[logging]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive, e.g. `"info"` or `"waypoint_engine=debug"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for daily-rotated JSON log files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl LoggingSection {
    fn merge(&mut self, other: LoggingSection) {
        if other.level.is_some() {
            self.level = other.level;
        }
        if other.dir.is_some() {
            self.dir = other.dir;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
