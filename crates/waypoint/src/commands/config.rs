//! Config command - inspect the layered configuration.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;
use waypoint_config::WaypointConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration (default)
    Show,

    /// Show which config files were checked and their precedence
    Which,

    /// Show the user configuration file path
    Path,
}

#[derive(Debug, Serialize)]
struct ShowOutput<'a> {
    sources: Vec<&'a std::path::Path>,
    warnings: &'a [String],
    config: &'a WaypointConfig,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<ExitCode> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => cmd_show(ctx)?,
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    if ctx.json_output {
        let output = ShowOutput {
            sources: loaded.loaded_from(),
            warnings: &loaded.warnings,
            config: &loaded.config,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("# waypoint configuration");
    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# no config files loaded (using defaults)");
    } else {
        for source in sources {
            println!("# from {}", source.display());
        }
    }
    for warning in &loaded.warnings {
        println!("# {}", dim.apply_to(format!("warning: {warning}")));
    }
    println!();
    print!("{}", loaded.config.to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) {
    let green = Style::new().green();
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Config sources (lowest precedence first)").bold());
    for source in &ctx.loaded.sources {
        let marker = if source.loaded {
            green.apply_to("● loaded")
        } else {
            dim.apply_to("○ absent")
        };
        println!("  {} {}", marker, source.path.display());
    }
    println!();
}

fn cmd_path(ctx: &Context) {
    let path = match &ctx.config_dir {
        Some(dir) => Some(dir.join("config.toml")),
        None => waypoint_config::xdg_config_path(),
    };
    match path {
        Some(path) => println!("{}", path.display()),
        None => println!("(no user config directory on this platform)"),
    }
}
