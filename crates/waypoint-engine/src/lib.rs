//! Declarative workflow state machine engine.
//!
//! A workflow is a named graph of states. An execution threads one JSON
//! document through the graph: each step may read a slice of the document,
//! hand it to a unit of work, and merge the result back at a path. Branch
//! states route on conditions over the document, retry rules and catch
//! rules decide what happens when a step fails.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ExecutionEngine                                         │
//! │  - Registered workflows (validated, compiled)            │
//! │  - UnitRegistry: name -> Arc<dyn UnitOfWork>             │
//! │  - execute / spawn / cancel                              │
//! └──────────────┬───────────────────────────────────────────┘
//!                │ per execution
//! ┌──────────────▼───────────────────────────────────────────┐
//! │  Runtime                                                 │
//! │  - Document (exclusively owned)                          │
//! │  - step loop: resolve -> invoke/transform -> inject      │
//! │  - retry backoff, catch routing, ExecutionHistory        │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod execution;
pub mod expression;
pub mod history;
pub mod path;
pub mod protocol;
pub mod resolver;
pub mod retry;
mod runtime;
pub mod units;
pub mod workflow;

pub use config::{EngineConfig, Environment};
pub use definition::{StateDefinition, WorkflowDefinition};
pub use document::Document;
pub use error::{EngineError, ErrorCategory, Failure, Result};
pub use execution::{ExecutionEngine, ExecutionHandle, ExecutionResult, ExecutionStatus};
pub use expression::{EvalOptions, Expression};
pub use history::{ExecutionHistory, StepRecord, StepStatus};
pub use path::Path;
pub use protocol::UnitResponse;
pub use resolver::MissingPathPolicy;
pub use retry::{CatchRule, RetryRule};
pub use units::{FnUnit, ScriptedUnit, UnitContext, UnitOfWork, UnitRegistry};
pub use workflow::{State, StateKind, Workflow};
