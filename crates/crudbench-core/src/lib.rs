//! crudbench core
//!
//! Model-agnostic pieces of a cross-model CRUD benchmark:
//!
//! - **Operations**: validated, storage-independent CRUD descriptions
//! - **Adapters**: the [`ModelAdapter`] contract each storage model implements
//! - **Timer**: monotonic measurement of single adapter calls
//! - **Driver**: runs an operation sequence against every registered model
//! - **Report**: ordered results with per-model, per-kind aggregation
//!
//! # Example
//!
//! ```ignore
//! use crudbench_core::{Driver, Field, OperationSpec, Predicate, RunOptions, Target};
//!
//! let mut driver = Driver::new();
//! driver.register("relational", relational_adapter)?;
//! driver.register("doc_txn", document_adapter)?;
//!
//! let ops = vec![
//!     OperationSpec::create(Target::invoice("1"), [(Field::Amount, 10)])?,
//!     OperationSpec::read(Target::invoice("1"), Predicate::target())?,
//! ];
//! let report = driver.run(&ops, &RunOptions::default()).await?;
//! for row in report.rows() {
//!     println!("{} {} {:?}", row.model_name, row.operation_kind, row.duration);
//! }
//! ```

pub mod adapter;
pub mod driver;
pub mod error;
pub mod histogram;
pub mod operation;
pub mod options;
pub mod report;
pub mod result;
pub mod timer;

pub use adapter::{AdapterError, ModelAdapter, Outcome, Plan};
pub use driver::{Driver, DriverState};
pub use error::{Error, Result};
pub use operation::{
    is_cancellation, Condition, Field, OperationKind, OperationSpec, Payload, Predicate, Target,
};
pub use options::RunOptions;
pub use report::{KindSummary, Report, ReportRow, RunStatus};
pub use result::{ExecutionOutcome, ExecutionResult};
pub use timer::Timer;

pub use async_trait::async_trait;
