//! Storage-model adapters for crudbench.
//!
//! Three models of the same invoice data:
//!
//! - [`RelationalAdapter`]: normalized customers and invoices tables in SQLite.
//! - [`TransactionCentricAdapter`]: one sled document per invoice.
//! - [`CustomerCentricAdapter`]: one sled document per customer, invoices embedded.
//!
//! Stores live in a scratch directory owned by the adapter unless a data
//! directory is configured, and keep their contents between runs.
//!
//! # Example
//!
//! ```ignore
//! use crudbench_adapters::{ModelKind, ModelOptions, Workload};
//! use crudbench_core::{Driver, RunOptions};
//!
//! let mut driver = Driver::new();
//! for kind in ModelKind::ALL {
//!     driver.register(kind.name(), kind.build(&ModelOptions::default()))?;
//! }
//! let report = driver.run(Workload::example()?.operations(), &RunOptions::default()).await?;
//! ```

pub mod document;
pub mod error;
mod location;
pub mod relational;
pub mod workload;

pub use document::{CustomerCentricAdapter, DocumentStoreConfig, TransactionCentricAdapter};
pub use error::{StoreError, StoreResult};
pub use relational::{RelationalAdapter, RelationalConfig};
pub use workload::{generate_invoices, InvoiceData, Scale, Workload};

use std::fmt;
use std::path::PathBuf;

use crudbench_core::ModelAdapter;

/// The storage models available to a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Relational,
    DocTxn,
    DocCustomer,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Relational, ModelKind::DocTxn, ModelKind::DocCustomer];

    /// Model name used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Relational => "relational",
            ModelKind::DocTxn => "doc_txn",
            ModelKind::DocCustomer => "doc_customer",
        }
    }

    /// Build a fresh adapter for this model.
    pub fn build(&self, options: &ModelOptions) -> Box<dyn ModelAdapter> {
        match self {
            ModelKind::Relational => {
                let mut config = RelationalConfig::new().with_explain(options.explain);
                if let Some(dir) = &options.data_dir {
                    config = config.with_data_dir(dir);
                }
                Box::new(RelationalAdapter::new(config))
            }
            ModelKind::DocTxn => Box::new(TransactionCentricAdapter::new(options.document_config())),
            ModelKind::DocCustomer => Box::new(CustomerCentricAdapter::new(options.document_config())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings applied to every adapter built by [`ModelKind::build`].
#[derive(Debug, Clone)]
pub struct ModelOptions {
    /// Shared data directory; each model uses its own entry inside it.
    pub data_dir: Option<PathBuf>,

    /// Capture plans for predicate operations.
    pub explain: bool,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            explain: true,
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_explain(mut self, enabled: bool) -> Self {
        self.explain = enabled;
        self
    }

    fn document_config(&self) -> DocumentStoreConfig {
        let mut config = DocumentStoreConfig::new().with_explain(self.explain);
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        config
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_names() {
        let names: Vec<_> = ModelKind::ALL.iter().map(ModelKind::name).collect();
        assert_eq!(names, vec!["relational", "doc_txn", "doc_customer"]);
        assert_eq!(ModelKind::DocTxn.to_string(), "doc_txn");
    }

    #[test]
    fn test_model_options_builder() {
        let options = ModelOptions::new().with_data_dir("/tmp/crudbench").with_explain(false);
        assert_eq!(options.data_dir, Some(PathBuf::from("/tmp/crudbench")));

        let config = options.document_config();
        assert!(!config.explain);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/crudbench")));
    }
}
