//! The state machine loop.
//!
//! One [`Runtime`] drives one execution: it owns the document, runs exactly
//! one state at a time, and appends a [`StepRecord`] per step. Suspension
//! only happens while a unit is in flight or during a retry backoff, and
//! both race the cancellation token.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{ErrorCategory, Failure};
use crate::execution::ExecutionStatus;
use crate::expression::EvalOptions;
use crate::history::{ExecutionHistory, StepRecord, StepStatus};
use crate::path::Path;
use crate::resolver::{ParamSpec, inject_result, restrict_input};
use crate::retry::{CatchRule, RetryDecision, RetryTracker, find_catch};
use crate::units::{UnitContext, UnitRegistry};
use crate::workflow::{
    BranchState, FailState, InvokeState, State, TransformBody, TransformState, Workflow,
};

/// Where the loop goes after a step.
#[derive(Debug)]
enum Transition {
    Next(String),
    Succeed,
    Fail(Failure),
    Crash(Failure),
    Cancelled,
}

#[derive(Debug)]
struct StepOutcome {
    status: StepStatus,
    attempts: u32,
    backoff: Duration,
    error: Option<Failure>,
    transition: Transition,
}

impl StepOutcome {
    fn next(next: &str) -> Self {
        Self::advanced(StepStatus::Succeeded, Transition::Next(next.to_string()))
    }

    fn advanced(status: StepStatus, transition: Transition) -> Self {
        Self {
            status,
            attempts: 1,
            backoff: Duration::ZERO,
            error: None,
            transition,
        }
    }

    fn crash(failure: Failure) -> Self {
        Self {
            status: StepStatus::Failed,
            attempts: 1,
            backoff: Duration::ZERO,
            error: Some(failure.clone()),
            transition: Transition::Crash(failure),
        }
    }

    fn cancelled(attempts: u32, backoff: Duration) -> Self {
        Self {
            status: StepStatus::Cancelled,
            attempts,
            backoff,
            error: None,
            transition: Transition::Cancelled,
        }
    }

    fn with_attempts(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts;
        self.backoff = backoff;
        self
    }
}

/// Final state of a finished run.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub status: ExecutionStatus,
    pub document: Document,
    pub history: ExecutionHistory,
}

pub(crate) struct Runtime {
    workflow: Arc<Workflow>,
    units: Arc<UnitRegistry>,
    config: Arc<EngineConfig>,
    eval: EvalOptions,
    execution_id: String,
    cancel: CancellationToken,
}

impl Runtime {
    pub fn new(
        workflow: Arc<Workflow>,
        units: Arc<UnitRegistry>,
        config: Arc<EngineConfig>,
        execution_id: String,
        cancel: CancellationToken,
    ) -> Self {
        let eval = config.eval_options();
        Self {
            workflow,
            units,
            config,
            eval,
            execution_id,
            cancel,
        }
    }

    pub async fn run(&self, input: Value) -> RunOutcome {
        let mut document = Document::new(input);
        let mut history = ExecutionHistory::new();
        let mut current = self.workflow.start().to_string();
        let mut steps = 0usize;

        let status = loop {
            if self.cancel.is_cancelled() {
                break ExecutionStatus::Cancelled { state: current };
            }
            if steps >= self.config.max_steps {
                break ExecutionStatus::Crashed {
                    state: current,
                    category: ErrorCategory::StepLimitExceeded,
                    cause: format!(
                        "execution exceeded the limit of {} steps",
                        self.config.max_steps
                    ),
                };
            }
            steps += 1;

            let Some(state) = self.workflow.state(&current) else {
                break ExecutionStatus::Crashed {
                    cause: format!("state '{current}' does not exist"),
                    state: current,
                    category: ErrorCategory::TaskFailed,
                };
            };

            debug!(
                execution_id = %self.execution_id,
                state = %current,
                kind = ?state.kind(),
                "Step started"
            );
            let started_at = Utc::now();
            let input_snapshot = document.snapshot();

            let outcome = match state {
                State::Invoke(invoke) => self.invoke(&current, invoke, &mut document).await,
                State::Transform(transform) => self.transform(&current, transform, &mut document),
                State::Branch(branch) => self.branch(branch, &document),
                State::Succeed => StepOutcome::advanced(StepStatus::Succeeded, Transition::Succeed),
                State::Fail(fail) => fail_outcome(fail),
            };

            let next = match &outcome.transition {
                Transition::Next(next) => Some(next.clone()),
                _ => None,
            };
            debug!(
                execution_id = %self.execution_id,
                state = %current,
                status = ?outcome.status,
                attempts = outcome.attempts,
                next = next.as_deref().unwrap_or("-"),
                "Step finished"
            );
            history.push(StepRecord {
                state: current.clone(),
                kind: state.kind(),
                input: input_snapshot,
                output: document.snapshot(),
                status: outcome.status,
                attempts: outcome.attempts,
                backoff: outcome.backoff,
                error: outcome.error,
                next,
                started_at,
                finished_at: Utc::now(),
            });

            match outcome.transition {
                Transition::Next(next) => current = next,
                Transition::Succeed => break ExecutionStatus::Succeeded,
                Transition::Fail(failure) => {
                    break ExecutionStatus::Failed {
                        category: failure.category,
                        cause: failure.cause,
                    };
                }
                Transition::Crash(failure) => {
                    break ExecutionStatus::Crashed {
                        state: current,
                        category: failure.category,
                        cause: failure.cause,
                    };
                }
                Transition::Cancelled => break ExecutionStatus::Cancelled { state: current },
            }
        };

        RunOutcome {
            status,
            document,
            history,
        }
    }

    /// Restricted input, replaced by the projection when one is declared.
    fn prepare_input(
        &self,
        document: &Document,
        input_path: Option<&Path>,
        parameters: Option<&ParamSpec>,
    ) -> Result<Value, Failure> {
        let input = restrict_input(document, input_path, self.config.missing_input_path)?;
        match parameters {
            Some(spec) => spec.project(&input, &self.eval),
            None => Ok(input),
        }
    }

    async fn invoke(
        &self,
        name: &str,
        state: &InvokeState,
        document: &mut Document,
    ) -> StepOutcome {
        // Resolver and evaluator faults are never retried.
        let input = match self.prepare_input(
            document,
            state.input_path.as_ref(),
            state.parameters.as_ref(),
        ) {
            Ok(input) => input,
            Err(failure) => return self.handle_failure(name, &state.catch, failure, document),
        };

        let Some(unit) = self.units.get(&state.unit) else {
            let failure = Failure::task_failed(format!("unit '{}' is not registered", state.unit));
            return self.handle_failure(name, &state.catch, failure, document);
        };
        let timeout = state.timeout.unwrap_or(self.config.unit_timeout);
        let mut tracker = RetryTracker::new(&state.retry);

        loop {
            if self.cancel.is_cancelled() {
                return StepOutcome::cancelled(tracker.attempts(), tracker.total_backoff());
            }

            let ctx = UnitContext {
                execution_id: self.execution_id.clone(),
                state: name.to_string(),
                attempt: tracker.attempts(),
                environment: Arc::clone(&self.config.environment),
            };
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return StepOutcome::cancelled(tracker.attempts(), tracker.total_backoff());
                }
                result = tokio::time::timeout(timeout, unit.invoke(input.clone(), &ctx)) => result,
            };

            let failure = match result {
                Ok(Ok(output)) => {
                    let outcome = match inject_result(document, &state.result_path, output) {
                        Ok(()) => StepOutcome::next(&state.next),
                        Err(failure) => self.handle_failure(name, &state.catch, failure, document),
                    };
                    return outcome.with_attempts(tracker.attempts(), tracker.total_backoff());
                }
                Ok(Err(failure)) => failure,
                Err(_) => Failure::timeout(format!(
                    "unit '{}' did not respond within {}ms",
                    state.unit,
                    timeout.as_millis()
                )),
            };

            match tracker.on_failure(&failure) {
                RetryDecision::Retry { attempt, delay } => {
                    warn!(
                        execution_id = %self.execution_id,
                        state = %name,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        category = %failure.category,
                        cause = %failure.cause,
                        "Unit failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return StepOutcome::cancelled(tracker.attempts() - 1, tracker.total_backoff());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    return self
                        .handle_failure(name, &state.catch, failure, document)
                        .with_attempts(tracker.attempts(), tracker.total_backoff());
                }
            }
        }
    }

    fn transform(&self, name: &str, state: &TransformState, document: &mut Document) -> StepOutcome {
        let result = restrict_input(document, state.input_path.as_ref(), self.config.missing_input_path)
            .and_then(|input| match &state.body {
                TransformBody::Expression(expr) => Ok(expr.evaluate(&input, &self.eval)?),
                TransformBody::Parameters(spec) => spec.project(&input, &self.eval),
            })
            .and_then(|result| inject_result(document, &state.result_path, result));

        match result {
            Ok(()) => StepOutcome::next(&state.next),
            Err(failure) => self.handle_failure(name, &state.catch, failure, document),
        }
    }

    fn branch(&self, state: &BranchState, document: &Document) -> StepOutcome {
        for choice in &state.choices {
            match choice.condition.evaluate_condition(document.as_value(), &self.eval) {
                Ok(true) => return StepOutcome::next(&choice.next),
                Ok(false) => {}
                Err(err) => return StepOutcome::crash(err.into()),
            }
        }
        StepOutcome::next(&state.default)
    }

    /// Route a failure through the catch rules, or crash.
    fn handle_failure(
        &self,
        name: &str,
        catches: &[CatchRule],
        failure: Failure,
        document: &mut Document,
    ) -> StepOutcome {
        let Some(rule) = find_catch(catches, &failure) else {
            return StepOutcome::crash(failure);
        };
        if let Err(inject_failure) = inject_result(document, &rule.result_path, failure.to_payload())
        {
            return StepOutcome::crash(inject_failure);
        }
        debug!(
            execution_id = %self.execution_id,
            state = %name,
            category = %failure.category,
            next = %rule.next,
            "Failure caught"
        );
        StepOutcome {
            status: StepStatus::Caught,
            attempts: 1,
            backoff: Duration::ZERO,
            error: Some(failure),
            transition: Transition::Next(rule.next.clone()),
        }
    }
}

fn fail_outcome(state: &FailState) -> StepOutcome {
    let failure = Failure::new(state.error.clone(), state.cause.clone());
    StepOutcome {
        status: StepStatus::Failed,
        attempts: 1,
        backoff: Duration::ZERO,
        error: Some(failure.clone()),
        transition: Transition::Fail(failure),
    }
}
