//! Units of work: the external computations invoke states call.
//!
//! A unit is opaque to the engine. It receives the projected input and either
//! returns a JSON value or a [`Failure`] whose category drives retry and catch
//! handling.
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_engine::{Failure, UnitContext, UnitOfWork, UnitRegistry};
//!
//! struct Classify;
//!
//! #[async_trait]
//! impl UnitOfWork for Classify {
//!     fn name(&self) -> &str { "classify" }
//!
//!     async fn invoke(&self, input: Value, _ctx: &UnitContext) -> Result<Value, Failure> {
//!         Ok(json!({"documentType": "INVOICE", "confidence": 0.94}))
//!     }
//! }
//!
//! let mut registry = UnitRegistry::new();
//! registry.register(Classify);
//! ```

mod function;
mod lookup;
mod notify;
mod scripted;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Environment;
use crate::error::Failure;

pub use function::{FnUnit, UnitFn};
pub use lookup::{ConfigStore, InMemoryConfigStore, LookupUnit};
pub use notify::{ChannelSink, Notification, NotificationSink, NotifyUnit, TracingSink};
pub use scripted::{ScriptedCall, ScriptedUnit};

/// An external computation invoked by name.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Name invoke states refer to.
    fn name(&self) -> &str;

    async fn invoke(&self, input: Value, ctx: &UnitContext) -> Result<Value, Failure>;
}

/// Per-invocation context.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub execution_id: String,
    /// Name of the invoking state.
    pub state: String,
    /// 1-based attempt number within the step.
    pub attempt: u32,
    pub environment: Arc<Environment>,
}

impl UnitContext {
    /// A context for calling a unit outside an execution.
    pub fn detached(state: impl Into<String>) -> Self {
        Self {
            execution_id: String::new(),
            state: state.into(),
            attempt: 1,
            environment: Arc::new(Environment::new()),
        }
    }
}

/// Units available to an engine, keyed by name.
#[derive(Default, Clone)]
pub struct UnitRegistry {
    units: HashMap<String, Arc<dyn UnitOfWork>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit, replacing any unit with the same name.
    pub fn register<U: UnitOfWork + 'static>(&mut self, unit: U) {
        let name = unit.name().to_string();
        self.units.insert(name, Arc::new(unit));
    }

    pub fn register_arc(&mut self, unit: Arc<dyn UnitOfWork>) {
        let name = unit.name().to_string();
        self.units.insert(name, unit);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn UnitOfWork>> {
        self.units.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.units.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("units", &self.names())
            .finish()
    }
}
