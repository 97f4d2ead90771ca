//! crudbench - compare CRUD latency across storage models.
//!
//! Runs one workload against the relational, transaction-centric and
//! customer-centric models and prints a per-model latency report.

mod config;
mod formatter;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Args, BenchConfig};
use crudbench_core::{Driver, RunStatus};
use formatter::create_formatter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout carries the report; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crudbench=info,crudbench_core=info,crudbench_adapters=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Args::parse().into_config();
    let formatter = create_formatter(config.format);

    if let Err(e) = run(config).await {
        eprintln!("{}", formatter.format_error(&e.to_string()));
        std::process::exit(1);
    }
}

async fn run(config: BenchConfig) -> Result<(), Box<dyn std::error::Error>> {
    let workload = config.build_workload()?;

    let mut driver = Driver::new();
    for kind in &config.models {
        driver.register(kind.name(), kind.build(&config.model_options))?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        models = ?driver.model_names(),
        operations = workload.len(),
        seed = config.seed,
        data_dir = ?config.model_options.data_dir,
        "configuration loaded"
    );

    // Ctrl-C stops the run between operations; the partial report is kept.
    let cancel = driver.cancellation_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received interrupt, cancelling run");
        cancel.cancel();
    });

    let report = driver.run(workload.operations(), &config.run_options).await?;

    let formatter = create_formatter(config.format);
    let output = if config.rows {
        formatter.format_rows(&report.rows())
    } else {
        formatter.format_summary(&report.summary())
    };
    println!("{}", output);

    if config.show_plans {
        println!("{}", formatter.format_plans(&report));
    }

    match report.status() {
        RunStatus::Completed => Ok(()),
        RunStatus::Cancelled => {
            tracing::warn!(entries = report.len(), "run cancelled before completion");
            Ok(())
        }
        RunStatus::Failed => Err(format!(
            "run stopped after {} of {} executions",
            report.len(),
            workload.len() * config.models.len()
        )
        .into()),
    }
}
