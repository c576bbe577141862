//! CLI command handlers.

pub mod config;
pub mod run;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use waypoint_config::{LoadedConfig, MissingInputPath, WaypointConfig};
use waypoint_engine::{EngineConfig, MissingPathPolicy};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// User config directory override from `--config`.
    pub config_dir: Option<PathBuf>,
    /// Layered configuration resolved at startup.
    pub loaded: LoadedConfig,
}

impl Context {
    /// Engine settings from the `[engine]` and `[environment]` sections, with
    /// engine defaults for anything unset.
    pub fn engine_config(&self) -> EngineConfig {
        engine_config(&self.loaded.config)
    }
}

fn engine_config(config: &WaypointConfig) -> EngineConfig {
    let section = config.engine();
    let defaults = EngineConfig::default();
    EngineConfig {
        max_steps: section.max_steps.unwrap_or(defaults.max_steps),
        unit_timeout: section
            .unit_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.unit_timeout),
        allow_cycles: section.allow_cycles.unwrap_or(defaults.allow_cycles),
        missing_input_path: match section.missing_input_path {
            Some(MissingInputPath::Null) => MissingPathPolicy::Null,
            Some(MissingInputPath::Fail) | None => MissingPathPolicy::Fail,
        },
        type_fallback: section.type_fallback,
        environment: Arc::new(config.environment.clone()),
    }
}
