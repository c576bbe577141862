//! Closure-backed units.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{UnitContext, UnitOfWork};
use crate::error::Failure;

/// The async function behind an [`FnUnit`].
///
/// Takes the input and an owned context, returns the output or a failure.
pub type UnitFn = Arc<
    dyn Fn(Value, UnitContext) -> Pin<Box<dyn Future<Output = Result<Value, Failure>> + Send>>
        + Send
        + Sync,
>;

/// A unit defined by an async closure.
pub struct FnUnit {
    name: String,
    func: UnitFn,
}

impl FnUnit {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, UnitContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |input, ctx| Box::pin(func(input, ctx))),
        }
    }

    pub fn from_fn(name: impl Into<String>, func: UnitFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl UnitOfWork for FnUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: Value, ctx: &UnitContext) -> Result<Value, Failure> {
        (self.func)(input, ctx.clone()).await
    }
}

impl std::fmt::Debug for FnUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnUnit").field("name", &self.name).finish()
    }
}
