//! Execution controller.
//!
//! [`ExecutionEngine`] holds the registered workflows and units and starts
//! executions. Each execution owns its document exclusively, so any number
//! of them may run in parallel with no shared mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorCategory, Result};
use crate::history::ExecutionHistory;
use crate::runtime::Runtime;
use crate::units::UnitRegistry;
use crate::workflow::Workflow;

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// A succeed state was reached.
    Succeeded,
    /// A fail state was reached.
    Failed {
        category: ErrorCategory,
        cause: String,
    },
    /// A failure propagated past every catch rule.
    Crashed {
        state: String,
        category: ErrorCategory,
        cause: String,
    },
    /// Cancelled while running `state`.
    Cancelled { state: String },
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Failure category of any non-success status.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Succeeded => None,
            Self::Failed { category, .. } | Self::Crashed { category, .. } => {
                Some(category.clone())
            }
            Self::Cancelled { .. } => Some(ErrorCategory::Cancelled),
        }
    }

    /// Human-readable cause of any non-success status.
    pub fn cause(&self) -> Option<String> {
        match self {
            Self::Succeeded => None,
            Self::Failed { cause, .. } => Some(cause.clone()),
            Self::Crashed { state, cause, .. } => Some(format!("state '{state}': {cause}")),
            Self::Cancelled { state } => Some(format!("execution cancelled in state '{state}'")),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Crashed { .. } => "crashed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Result of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub workflow: String,
    pub status: ExecutionStatus,
    /// The document as it stood when the execution ended.
    pub output: Value,
    pub history: ExecutionHistory,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A running execution started with [`ExecutionEngine::spawn`].
#[derive(Debug)]
pub struct ExecutionHandle {
    id: String,
    cancel: CancellationToken,
    join: JoinHandle<ExecutionResult>,
}

impl ExecutionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request cancellation. Takes effect at the next step boundary, or
    /// immediately during a backoff wait or unit call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<ExecutionResult> {
        self.join
            .await
            .map_err(|e| EngineError::Join(e.to_string()))
    }
}

/// Registers workflows and runs executions.
pub struct ExecutionEngine {
    units: Arc<UnitRegistry>,
    config: Arc<EngineConfig>,
    workflows: Arc<RwLock<HashMap<String, Arc<Workflow>>>>,
}

impl ExecutionEngine {
    pub fn new(units: UnitRegistry, config: EngineConfig) -> Self {
        info!(
            units = units.len(),
            max_steps = config.max_steps,
            allow_cycles = config.allow_cycles,
            "Execution engine initialized"
        );
        Self {
            units: Arc::new(units),
            config: Arc::new(config),
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// Register a workflow, replacing any previous one with the same name.
    ///
    /// Fails if an invoke state names an unregistered unit, or if the graph
    /// has a cycle while cycles are disallowed.
    pub async fn register_workflow(&self, workflow: Workflow) -> Result<()> {
        let name = workflow.name().to_string();
        debug!(workflow = %name, "Registering workflow");

        let missing: Vec<&str> = workflow
            .unit_names()
            .into_iter()
            .filter(|unit| !self.units.contains(unit))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Validation(format!(
                "workflow '{name}' invokes unregistered units: {}",
                missing.join(", ")
            )));
        }
        if !self.config.allow_cycles {
            workflow.detect_cycles()?;
        }

        let mut workflows = self.workflows.write().await;
        if workflows.insert(name.clone(), Arc::new(workflow)).is_some() {
            warn!(workflow = %name, "Replaced existing workflow");
        }
        info!(workflow = %name, "Workflow registered");
        Ok(())
    }

    pub async fn has_workflow(&self, name: &str) -> bool {
        self.workflows.read().await.contains_key(name)
    }

    /// Registered workflow names, sorted.
    pub async fn list_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a workflow to completion.
    pub async fn execute(&self, name: &str, input: Value) -> Result<ExecutionResult> {
        self.execute_with_cancellation(name, input, CancellationToken::new())
            .await
    }

    /// Run a workflow to completion, stopping early if `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        name: &str,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult> {
        let workflow = self.workflow(name).await?;
        let execution_id = Uuid::new_v4().to_string();
        Ok(run_execution(
            workflow,
            Arc::clone(&self.units),
            Arc::clone(&self.config),
            execution_id,
            input,
            cancel,
        )
        .await)
    }

    /// Start a workflow on the tokio runtime and return a handle to it.
    pub async fn spawn(&self, name: &str, input: Value) -> Result<ExecutionHandle> {
        let workflow = self.workflow(name).await?;
        let id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_execution(
            workflow,
            Arc::clone(&self.units),
            Arc::clone(&self.config),
            id.clone(),
            input,
            cancel.clone(),
        ));
        Ok(ExecutionHandle { id, cancel, join })
    }

    async fn workflow(&self, name: &str) -> Result<Arc<Workflow>> {
        self.workflows
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotFound(name.to_string()))
    }
}

async fn run_execution(
    workflow: Arc<Workflow>,
    units: Arc<UnitRegistry>,
    config: Arc<EngineConfig>,
    execution_id: String,
    input: Value,
    cancel: CancellationToken,
) -> ExecutionResult {
    let span = info_span!("execution", execution_id = %execution_id, workflow = %workflow.name());
    async move {
        let started_at = Utc::now();
        info!("Execution started");

        let workflow_name = workflow.name().to_string();
        let runtime = Runtime::new(workflow, units, config, execution_id.clone(), cancel);
        let outcome = runtime.run(input).await;

        let finished_at = Utc::now();
        match &outcome.status {
            ExecutionStatus::Succeeded => info!(steps = outcome.history.len(), "Execution succeeded"),
            status => info!(
                steps = outcome.history.len(),
                status = status.label(),
                category = status.category().map(|c| c.to_string()).unwrap_or_default(),
                cause = status.cause().unwrap_or_default(),
                "Execution terminated"
            ),
        }

        ExecutionResult {
            execution_id,
            workflow: workflow_name,
            status: outcome.status,
            output: outcome.document.into_value(),
            history: outcome.history,
            started_at,
            finished_at,
        }
    }
    .instrument(span)
    .await
}
