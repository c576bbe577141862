//! Retry, catch and cancellation behavior under a paused clock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use waypoint_engine::{
    EngineConfig, ErrorCategory, ExecutionEngine, ExecutionStatus, Failure, ScriptedUnit,
    StepStatus, UnitRegistry, UnitResponse, Workflow,
};

fn retrying_workflow(catch_next: &str) -> Value {
    json!({
        "name": "extract",
        "start": "Extract",
        "states": {
            "Extract": {
                "type": "invoke",
                "unit": "extract",
                "result_path": "extractionResult",
                "retry": [{
                    "errors": ["TaskFailed"],
                    "initial_delay_ms": 2000,
                    "multiplier": 2.0,
                    "max_attempts": 3
                }],
                "catch": [{"errors": ["all"], "result_path": "extractionError", "next": catch_next}],
                "next": "Done"
            },
            "NotifyFailure": {"type": "succeed"},
            "Done": {"type": "succeed"}
        }
    })
}

async fn engine(unit: Arc<ScriptedUnit>, workflow: Value) -> ExecutionEngine {
    let mut units = UnitRegistry::new();
    units.register_arc(unit);
    let engine = ExecutionEngine::new(units, EngineConfig::default());
    engine
        .register_workflow(Workflow::from_json(&workflow.to_string()).unwrap())
        .await
        .unwrap();
    engine
}

fn flaky() -> UnitResponse {
    UnitResponse::error(Failure::task_failed("extraction service unavailable"))
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success() {
    let unit = Arc::new(ScriptedUnit::new(
        "extract",
        vec![flaky(), flaky(), UnitResponse::ok(json!({"total": 10}))],
    ));
    let engine = engine(unit.clone(), retrying_workflow("NotifyFailure")).await;

    let started = tokio::time::Instant::now();
    let result = engine.execute("extract", json!({"id": "d1"})).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.output["extractionResult"], json!({"total": 10}));
    assert!(result.output.get("extractionError").is_none());

    let step = &result.history.records()[0];
    assert_eq!(step.status, StepStatus::Succeeded);
    assert_eq!(step.attempts, 3);
    assert_eq!(step.backoff, Duration::from_secs(6));
    assert!(started.elapsed() >= Duration::from_secs(6));

    let attempts: Vec<u32> = unit.calls().iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fall_through_to_catch() {
    let unit = Arc::new(ScriptedUnit::new("extract", vec![flaky()]));
    let engine = engine(unit.clone(), retrying_workflow("NotifyFailure")).await;

    let result = engine.execute("extract", json!({"id": "d1"})).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.history.path(), vec!["Extract", "NotifyFailure"]);
    assert_eq!(unit.call_count(), 3);

    let step = &result.history.records()[0];
    assert_eq!(step.status, StepStatus::Caught);
    assert_eq!(step.attempts, 3);
    assert_eq!(step.backoff, Duration::from_secs(6));
    assert_eq!(
        result.output,
        json!({
            "id": "d1",
            "extractionError": {"category": "TaskFailed", "cause": "extraction service unavailable"}
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_matching_category_is_not_retried() {
    let unit = Arc::new(ScriptedUnit::new(
        "extract",
        vec![UnitResponse::error(Failure::new("QuotaExceeded", "monthly quota used"))],
    ));
    let engine = engine(unit.clone(), retrying_workflow("NotifyFailure")).await;

    let result = engine.execute("extract", json!({})).await.unwrap();
    assert_eq!(unit.call_count(), 1);
    assert_eq!(result.history.records()[0].backoff, Duration::ZERO);
    assert_eq!(
        result.output["extractionError"]["category"],
        json!("QuotaExceeded")
    );
}

#[tokio::test(start_paused = true)]
async fn test_uncaught_failure_crashes_with_category_and_cause() {
    let unit = Arc::new(ScriptedUnit::new("extract", vec![flaky()]));
    let workflow = json!({
        "name": "extract",
        "start": "Extract",
        "states": {
            "Extract": {"type": "invoke", "unit": "extract", "next": "Done"},
            "Done": {"type": "succeed"}
        }
    });
    let engine = engine(unit, workflow).await;

    let result = engine.execute("extract", json!({"id": "d1"})).await.unwrap();
    assert_eq!(
        result.status,
        ExecutionStatus::Crashed {
            state: "Extract".into(),
            category: ErrorCategory::TaskFailed,
            cause: "extraction service unavailable".into(),
        }
    );
    assert_eq!(result.output, json!({"id": "d1"}));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff() {
    let unit = Arc::new(ScriptedUnit::new("extract", vec![flaky()]));
    let workflow = json!({
        "name": "extract",
        "start": "Extract",
        "states": {
            "Extract": {
                "type": "invoke",
                "unit": "extract",
                "retry": [{"errors": ["TaskFailed"], "initial_delay_ms": 60000, "max_attempts": 5}],
                "next": "Done"
            },
            "Done": {"type": "succeed"}
        }
    });
    let engine = engine(unit.clone(), workflow).await;

    let started = tokio::time::Instant::now();
    let handle = engine.spawn("extract", json!({})).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();
    let result = handle.wait().await.unwrap();

    assert_eq!(
        result.status,
        ExecutionStatus::Cancelled {
            state: "Extract".into()
        }
    );
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(unit.call_count(), 1);
    assert_eq!(result.history.path(), vec!["Extract"]);
    assert_eq!(result.history.records()[0].status, StepStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_inflight_unit() {
    let unit = Arc::new(
        ScriptedUnit::always("extract", json!({"total": 1})).with_delay(Duration::from_secs(60)),
    );
    let workflow = json!({
        "name": "extract",
        "start": "Extract",
        "states": {
            "Extract": {
                "type": "invoke",
                "unit": "extract",
                "result_path": "extractionResult",
                "next": "Done"
            },
            "Done": {"type": "succeed"}
        }
    });
    let engine = engine(unit.clone(), workflow).await;

    let input = json!({"document": {"id": "d1"}});
    let started = tokio::time::Instant::now();
    let handle = engine.spawn("extract", input.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();
    let result = handle.wait().await.unwrap();

    assert_eq!(
        result.status,
        ExecutionStatus::Cancelled {
            state: "Extract".into()
        }
    );
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(result.output.get("extractionResult").is_none());
    assert_eq!(result.output, input);
    assert_eq!(unit.call_count(), 1);
    assert_eq!(result.history.records()[0].status, StepStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_before_execution_invokes_nothing() {
    let unit = Arc::new(ScriptedUnit::always("extract", json!({})));
    let engine = engine(unit.clone(), retrying_workflow("NotifyFailure")).await;

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let result = engine
        .execute_with_cancellation("extract", json!({}), token)
        .await
        .unwrap();

    assert_eq!(result.status.category(), Some(ErrorCategory::Cancelled));
    assert!(result.history.is_empty());
    assert_eq!(unit.call_count(), 0);
}
