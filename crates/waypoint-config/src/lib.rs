//! Configuration for the waypoint workflow engine.
//!
//! TOML configuration with:
//! - Engine limits and resolution policies (`[engine]`)
//! - Log level and JSON log directory (`[logging]`)
//! - Free-form values handed to units (`[environment]`)
//! - Layering: user config dir, then project-local `waypoint.toml`

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
