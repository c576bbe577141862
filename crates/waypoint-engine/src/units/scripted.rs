//! Replay units for fixtures and tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{UnitContext, UnitOfWork};
use crate::error::Failure;
use crate::protocol::UnitResponse;

/// A recorded call to a [`ScriptedUnit`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    pub state: String,
    pub attempt: u32,
    pub input: Value,
}

#[derive(Debug)]
struct Script {
    pending: VecDeque<UnitResponse>,
    last: Option<UnitResponse>,
    calls: Vec<ScriptedCall>,
}

/// Replays a fixed sequence of responses, one per call.
///
/// Once the script runs out the final response repeats. An empty script
/// answers every call with a `TaskFailed` failure.
#[derive(Debug)]
pub struct ScriptedUnit {
    name: String,
    delay: Duration,
    script: Mutex<Script>,
}

impl ScriptedUnit {
    pub fn new(name: impl Into<String>, responses: impl IntoIterator<Item = UnitResponse>) -> Self {
        Self {
            name: name.into(),
            delay: Duration::ZERO,
            script: Mutex::new(Script {
                pending: responses.into_iter().collect(),
                last: None,
                calls: Vec::new(),
            }),
        }
    }

    /// A unit that always succeeds with `output`.
    pub fn always(name: impl Into<String>, output: Value) -> Self {
        Self::new(name, [UnitResponse::ok(output)])
    }

    /// Wait this long (on the tokio clock) before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.script.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().calls.len()
    }

    fn next_response(&self, input: Value, ctx: &UnitContext) -> Option<UnitResponse> {
        let mut script = self.script.lock();
        script.calls.push(ScriptedCall {
            state: ctx.state.clone(),
            attempt: ctx.attempt,
            input,
        });
        if let Some(response) = script.pending.pop_front() {
            script.last = Some(response);
        }
        script.last.clone()
    }
}

#[async_trait]
impl UnitOfWork for ScriptedUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: Value, ctx: &UnitContext) -> Result<Value, Failure> {
        // The lock is released before any await point.
        let response = self.next_response(input, ctx);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match response {
            Some(response) => response.into_result(),
            None => Err(Failure::task_failed(format!(
                "unit '{}' has no scripted responses",
                self.name
            ))),
        }
    }
}
