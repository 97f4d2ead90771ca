//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crudbench_adapters::{ModelKind, ModelOptions, Scale, Workload};
use crudbench_core::RunOptions;

use crate::formatter::OutputFormat;

/// Default number of generated invoices.
pub const DEFAULT_INVOICES: usize = 100;

/// Default RNG seed for workload generation.
pub const DEFAULT_SEED: u64 = 42;

/// Storage model selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    #[value(name = "relational")]
    Relational,
    #[value(name = "doc_txn")]
    DocTxn,
    #[value(name = "doc_customer")]
    DocCustomer,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Relational => ModelKind::Relational,
            ModelArg::DocTxn => ModelKind::DocTxn,
            ModelArg::DocCustomer => ModelKind::DocCustomer,
        }
    }
}

/// Workload size preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScaleArg {
    Tiny,
    Small,
    Medium,
    Large,
}

impl From<ScaleArg> for Scale {
    fn from(arg: ScaleArg) -> Self {
        match arg {
            ScaleArg::Tiny => Scale::Tiny,
            ScaleArg::Small => Scale::Small,
            ScaleArg::Medium => Scale::Medium,
            ScaleArg::Large => Scale::Large,
        }
    }
}

/// Which operation sequence to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkloadKind {
    /// Generated create/read/update/read/delete cycle per invoice.
    Standard,
    /// Four operations on invoice `1`.
    Example,
}

/// Benchmark run configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Models to compare, in report order.
    pub models: Vec<ModelKind>,

    pub workload: WorkloadKind,

    /// Invoices generated by the standard workload.
    pub invoices: usize,

    pub seed: u64,

    /// Times the whole sequence is played.
    pub repeat: usize,

    pub run_options: RunOptions,

    pub model_options: ModelOptions,

    pub format: OutputFormat,

    /// Print one line per execution instead of the summary.
    pub rows: bool,

    /// Print captured plans after the results.
    pub show_plans: bool,
}

impl BenchConfig {
    pub fn new() -> Self {
        Self {
            models: ModelKind::ALL.to_vec(),
            workload: WorkloadKind::Standard,
            invoices: DEFAULT_INVOICES,
            seed: DEFAULT_SEED,
            repeat: 1,
            run_options: RunOptions::default(),
            model_options: ModelOptions::default(),
            format: OutputFormat::Table,
            rows: false,
            show_plans: false,
        }
    }

    pub fn with_models(mut self, models: impl IntoIterator<Item = ModelKind>) -> Self {
        self.models = models.into_iter().collect();
        self
    }

    pub fn with_workload(mut self, workload: WorkloadKind) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_invoices(mut self, invoices: usize) -> Self {
        self.invoices = invoices;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.run_options = self.run_options.with_timeout(timeout);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Build the operation sequence this configuration describes.
    pub fn build_workload(&self) -> crudbench_core::Result<Workload> {
        let workload = match self.workload {
            WorkloadKind::Standard => Workload::standard(self.seed, self.invoices)?,
            WorkloadKind::Example => Workload::example()?,
        };
        Ok(workload.repeat(self.repeat))
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "crudbench")]
#[command(version, about = "Compare CRUD latency across relational and document storage models", long_about = None)]
pub struct Args {
    /// Models to benchmark, comma separated.
    #[arg(
        short,
        long,
        value_enum,
        value_delimiter = ',',
        default_value = "relational,doc_txn,doc_customer"
    )]
    pub models: Vec<ModelArg>,

    /// Operation sequence to run.
    #[arg(short, long, value_enum, default_value = "standard")]
    pub workload: WorkloadKind,

    /// Number of invoices for the standard workload.
    #[arg(short = 'n', long, default_value_t = DEFAULT_INVOICES)]
    pub invoices: usize,

    /// Size preset; overrides --invoices.
    #[arg(long, value_enum)]
    pub scale: Option<ScaleArg>,

    /// Seed for invoice generation.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Play the sequence this many times.
    #[arg(short, long, default_value_t = 1)]
    pub repeat: usize,

    /// Per-operation timeout in milliseconds. Set to 0 to disable.
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,

    /// Stop at the first failed operation.
    #[arg(long)]
    pub fail_fast: bool,

    /// Directory for store files. Defaults to a temporary directory.
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Skip plan capture.
    #[arg(long)]
    pub no_explain: bool,

    /// Output format.
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Print every execution instead of the per-model summary.
    #[arg(long)]
    pub rows: bool,

    /// Print captured plans.
    #[arg(long)]
    pub plans: bool,
}

impl Args {
    /// Convert command-line arguments to a run configuration.
    pub fn into_config(self) -> BenchConfig {
        let mut models: Vec<ModelKind> = Vec::with_capacity(self.models.len());
        for model in self.models.into_iter().map(ModelKind::from) {
            if !models.contains(&model) {
                models.push(model);
            }
        }

        let invoices = self
            .scale
            .map(|scale| Scale::from(scale).invoices())
            .unwrap_or(self.invoices);

        let mut run_options = RunOptions::default().with_continue_on_error(!self.fail_fast);
        if self.timeout_ms > 0 {
            run_options = run_options.with_timeout(Duration::from_millis(self.timeout_ms));
        }

        let mut model_options = ModelOptions::default().with_explain(!self.no_explain);
        if let Some(dir) = self.data_dir {
            model_options = model_options.with_data_dir(dir);
        }

        BenchConfig {
            models,
            workload: self.workload,
            invoices,
            seed: self.seed,
            repeat: self.repeat.max(1),
            run_options,
            model_options,
            format: self.format,
            rows: self.rows,
            show_plans: self.plans,
        }
    }
}
