//! waypoint - declarative workflow runner
//!
//! Main entry point for the waypoint CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{config, run, validate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// waypoint - validate and dry-run declarative workflows
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: ~/.config/waypoint)
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a workflow document
    Validate(validate::ValidateArgs),

    /// Run a workflow against scripted unit responses
    Run(run::RunArgs),

    /// Show the resolved configuration
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

const VERBOSE_FILTER: &str = "waypoint=debug,waypoint_engine=debug,waypoint_config=debug,info";
const DEFAULT_FILTER: &str = "waypoint=info,waypoint_engine=warn,waypoint_config=warn,warn";
const FILE_FILTER: &str = "waypoint=trace,waypoint_engine=trace,waypoint_config=trace,info";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = waypoint_config::load_config_with_options(None, cli.config.as_deref())?;
    let logging = loaded.config.logging();

    // Console (human-readable, stderr) + optional rotating JSON file
    let console_filter = if cli.verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(logging.level.as_deref().unwrap_or(DEFAULT_FILTER))
        })
    };

    let (file_layer, _guard) = match logging.dir.as_ref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "waypoint.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    for warning in &loaded.warnings {
        warn!("{warning}");
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config_dir: cli.config,
        loaded,
    };

    match cli.command {
        Commands::Validate(args) => validate::run(args, &ctx).await,
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
