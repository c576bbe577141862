//! Run command - execute a workflow against scripted units.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use waypoint_engine::{
    ExecutionEngine, ExecutionHistory, ExecutionResult, ExecutionStatus, ScriptedUnit,
    StepStatus, UnitRegistry, UnitResponse, Workflow,
};

use super::Context;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Workflow document (.json or .toml)
    pub workflow: PathBuf,

    /// Input document as inline JSON, or @path to read it from a file
    #[arg(short, long, default_value = "{}")]
    pub input: String,

    /// JSON file mapping unit names to scripted responses
    #[arg(short, long)]
    pub fixtures: Option<PathBuf>,

    /// Print the step history
    #[arg(long)]
    pub history: bool,
}

/// Scripted responses per unit name.
type Fixtures = BTreeMap<String, Vec<UnitResponse>>;

#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    execution_id: &'a str,
    workflow: &'a str,
    #[serde(flatten)]
    status: &'a ExecutionStatus,
    output: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<&'a ExecutionHistory>,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<ExitCode> {
    let workflow = Workflow::from_file(&args.workflow)
        .with_context(|| format!("invalid workflow {}", args.workflow.display()))?;
    let input = parse_input(&args.input)?;
    let fixtures = match &args.fixtures {
        Some(path) => load_fixtures(path)?,
        None => Fixtures::new(),
    };

    let mut units = UnitRegistry::new();
    for (name, responses) in fixtures {
        debug!(unit = %name, responses = responses.len(), "Registering scripted unit");
        units.register(ScriptedUnit::new(name, responses));
    }

    let name = workflow.name().to_string();
    let engine = ExecutionEngine::new(units, ctx.engine_config());
    engine.register_workflow(workflow).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling execution");
            on_interrupt.cancel();
        }
    });

    let result = engine
        .execute_with_cancellation(&name, input, cancel)
        .await?;

    if ctx.json_output {
        let output = RunOutput {
            execution_id: &result.execution_id,
            workflow: &result.workflow,
            status: &result.status,
            output: &result.output,
            history: args.history.then_some(&result.history),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_result(&result, args.history)?;
    }

    Ok(if result.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn parse_input(raw: &str) -> Result<Value> {
    let (source, text) = match raw.strip_prefix('@') {
        Some(path) => (
            path.to_string(),
            std::fs::read_to_string(path).with_context(|| format!("failed to read input {path}"))?,
        ),
        None => ("--input".to_string(), raw.to_string()),
    };
    serde_json::from_str(&text).with_context(|| format!("{source} is not valid JSON"))
}

fn load_fixtures(path: &Path) -> Result<Fixtures> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixtures {}", path.display()))?;
    let fixtures: Fixtures = serde_json::from_str(&text)
        .with_context(|| format!("invalid fixtures {}", path.display()))?;
    if let Some((unit, _)) = fixtures.iter().find(|(_, responses)| responses.is_empty()) {
        bail!("fixture for unit '{unit}' has no responses");
    }
    Ok(fixtures)
}

fn print_result(result: &ExecutionResult, with_history: bool) -> Result<()> {
    let dim = Style::new().dim();
    let status_style = if result.status.is_success() {
        Style::new().green()
    } else {
        Style::new().red()
    };

    println!();
    println!("{}", style(format!("Execution {}", result.workflow)).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Id:    "), result.execution_id);
    println!(
        "  {} {}",
        dim.apply_to("Status:"),
        status_style.apply_to(format!("● {}", result.status.label()))
    );
    if let Some(category) = result.status.category() {
        println!("  {} {}", dim.apply_to("Error: "), category);
    }
    if let Some(cause) = result.status.cause() {
        println!("  {} {}", dim.apply_to("Cause: "), cause);
    }
    println!("  {} {}", dim.apply_to("Steps: "), result.history.len());

    if with_history {
        println!();
        println!("{}", style("History").bold());
        for (i, record) in result.history.records().iter().enumerate() {
            let marker = match record.status {
                StepStatus::Succeeded => Style::new().green().apply_to("✓"),
                StepStatus::Caught => Style::new().yellow().apply_to("↪"),
                StepStatus::Failed => Style::new().red().apply_to("✗"),
                StepStatus::Cancelled => Style::new().dim().apply_to("■"),
            };
            let mut line = format!("{:>3}. {} {}", i + 1, marker, record.state);
            if record.attempts > 1 {
                line.push_str(&format!(
                    " (attempts: {}, backoff: {}ms)",
                    record.attempts,
                    record.backoff.as_millis()
                ));
            }
            if let Some(error) = &record.error {
                line.push_str(&format!(" [{}: {}]", error.category, error.cause));
            }
            if let Some(next) = &record.next {
                line.push_str(&format!(" → {next}"));
            }
            println!("  {line}");
        }
    }

    println!();
    println!("{}", style("Document").bold());
    println!("{}", serde_json::to_string_pretty(&result.output)?);
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_inline_input() {
        assert_eq!(
            parse_input(r#"{"document": {"id": "d1"}}"#).unwrap(),
            json!({"document": {"id": "d1"}})
        );
        assert!(parse_input("{not json").is_err());
    }

    #[test]
    fn test_parse_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"{"n": 1}"#).unwrap();
        let value = parse_input(&format!("@{}", path.display())).unwrap();
        assert_eq!(value, json!({"n": 1}));
    }

    #[test]
    fn test_load_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.json");
        std::fs::write(
            &path,
            r#"{
                "classify": [{"status": "ok", "output": {"documentType": "INVOICE"}}],
                "extract": [
                    {"status": "error", "error": {"category": "TaskFailed", "cause": "busy"}},
                    {"status": "ok", "output": {}}
                ]
            }"#,
        )
        .unwrap();
        let fixtures = load_fixtures(&path).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert!(!fixtures["extract"][0].is_ok());

        std::fs::write(&path, r#"{"classify": []}"#).unwrap();
        let err = load_fixtures(&path).unwrap_err();
        assert!(err.to_string().contains("no responses"));
    }
}
