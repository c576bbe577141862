//! Validate command - parse and check a workflow document.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use waypoint_engine::Workflow;

use super::Context;

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Workflow document (.json or .toml)
    pub workflow: PathBuf,
}

#[derive(Debug, Serialize)]
struct ValidateOutput<'a> {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<&'a str>,
    states: usize,
    units: Vec<&'a str>,
    terminal: Vec<&'a str>,
    warnings: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the validate command.
pub async fn run(args: ValidateArgs, ctx: &Context) -> Result<ExitCode> {
    let checked = Workflow::from_file(&args.workflow).and_then(|workflow| {
        if !ctx.engine_config().allow_cycles {
            workflow.detect_cycles()?;
        }
        Ok(workflow)
    });

    match checked {
        Ok(workflow) => {
            if ctx.json_output {
                let output = ValidateOutput {
                    valid: true,
                    workflow: Some(workflow.name()),
                    start: Some(workflow.start()),
                    states: workflow.len(),
                    units: workflow.unit_names(),
                    terminal: workflow.terminal_states(),
                    warnings: workflow.warnings(),
                    error: None,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_valid(&workflow, ctx);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if ctx.json_output {
                let output = ValidateOutput {
                    valid: false,
                    workflow: None,
                    start: None,
                    states: 0,
                    units: Vec::new(),
                    terminal: Vec::new(),
                    warnings: &[],
                    error: Some(e.to_string()),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                let red = Style::new().red();
                println!();
                println!(
                    "  {} {}",
                    red.apply_to("✗ invalid:"),
                    args.workflow.display()
                );
                println!("  {e}");
                println!();
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_valid(workflow: &Workflow, ctx: &Context) {
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let dim = Style::new().dim();

    println!();
    println!(
        "  {} {}",
        green.apply_to("✓ valid:"),
        style(workflow.name()).bold()
    );
    if let Some(comment) = workflow.comment() {
        println!("  {}", dim.apply_to(comment));
    }
    println!("  {} {}", dim.apply_to("States:"), workflow.len());
    println!("  {} {}", dim.apply_to("Start: "), workflow.start());

    let units = workflow.unit_names();
    if !units.is_empty() {
        println!("  {} {}", dim.apply_to("Units: "), units.join(", "));
    }
    println!(
        "  {} {}",
        dim.apply_to("Ends:  "),
        workflow.terminal_states().join(", ")
    );

    if ctx.verbose {
        println!();
        for (name, state) in workflow.states() {
            let kind = format!("{:?}", state.kind()).to_lowercase();
            let marker = if state.is_terminal() { " (end)" } else { "" };
            println!("    {:<28} {}", name, dim.apply_to(format!("{kind}{marker}")));
        }
    }

    for warning in workflow.warnings() {
        println!("  {} {}", yellow.apply_to("warning:"), warning);
    }
    println!();
}
