//! The contract every storage model implements.
//!
//! A [`ModelAdapter`] translates a validated [`OperationSpec`] into the
//! native request of one storage model, executes it, and reports how many
//! rows or documents it touched. Engine failures are returned as
//! [`AdapterError`] values; the driver records them and moves on.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::OperationSpec;

/// Execution plan captured from an engine.
///
/// Plans are passed through untouched; interpreting them is left to
/// whoever reads the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "plan", rename_all = "snake_case")]
pub enum Plan {
    /// Free-form text, e.g. SQLite `EXPLAIN QUERY PLAN` output.
    Text(String),
    /// Structured plan, e.g. a document store's execution stats.
    Structured(serde_json::Value),
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Text(text) => f.write_str(text),
            Plan::Structured(value) => write!(f, "{}", value),
        }
    }
}

/// Successful result of one adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Rows or documents returned (reads) or records affected (writes).
    pub count: u64,
    /// Plan for the executed query, when the engine can explain it.
    pub plan: Option<Plan>,
}

impl Outcome {
    pub fn new(count: u64) -> Self {
        Self { count, plan: None }
    }

    pub fn with_plan(mut self, plan: Option<Plan>) -> Self {
        self.plan = plan;
        self
    }
}

/// Failure of one adapter call.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum AdapterError {
    /// Engine or transport failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// The model cannot express this operation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// `execute` was called outside an open session.
    #[error("adapter is not open")]
    NotOpen,

    /// The session could not be opened for this run.
    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded the per-operation timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl AdapterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Timeout(_))
    }
}

/// A storage model under benchmark.
///
/// Adapters own their connection or session. The driver calls [`open`]
/// once before a run and [`close`] once after it, on every exit path.
/// Operations are executed one at a time, in the order given; adapters
/// must not reorder or batch them.
///
/// [`open`]: ModelAdapter::open
/// [`close`]: ModelAdapter::close
#[async_trait]
pub trait ModelAdapter: Send {
    /// Acquire the connection or session for a run.
    async fn open(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Execute one operation against the model.
    async fn execute(&mut self, op: &OperationSpec) -> Result<Outcome, AdapterError>;

    /// Release the connection or session.
    async fn close(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[async_trait]
impl<A: ModelAdapter + ?Sized> ModelAdapter for Box<A> {
    async fn open(&mut self) -> Result<(), AdapterError> {
        (**self).open().await
    }

    async fn execute(&mut self, op: &OperationSpec) -> Result<Outcome, AdapterError> {
        (**self).execute(op).await
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        (**self).close().await
    }
}
