//! Benchmark driver.
//!
//! The driver owns the registered adapters and runs a fixed operation
//! sequence against all of them. Operations form the outer loop and adapters
//! the inner loop, so every model sees operation N before any model sees
//! operation N+1. Execution is strictly sequential: adapters never run
//! concurrently, so their timings cannot contend with each other.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterError, ModelAdapter};
use crate::error::{Error, Result};
use crate::operation::OperationSpec;
use crate::options::RunOptions;
use crate::report::{Report, RunStatus};
use crate::timer::Timer;

/// Lifecycle state of a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No run started yet.
    Idle,
    /// A run is in progress.
    Running,
    /// The last run finished (all pairs processed, or cancelled).
    Completed,
    /// The last run could not start or stopped on an adapter error.
    Failed,
}

struct Registration {
    name: String,
    adapter: Box<dyn ModelAdapter>,
}

/// Runs CRUD workloads against registered model adapters.
pub struct Driver {
    registrations: Vec<Registration>,
    state: DriverState,
    cancel: CancellationToken,
}

impl Driver {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            state: DriverState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to request early termination of runs.
    ///
    /// The token is checked between (operation, model) pairs; a pair that
    /// has started always completes.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this driver's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register an adapter under a unique model name.
    pub fn register<A>(&mut self, model_name: impl Into<String>, adapter: A) -> Result<()>
    where
        A: ModelAdapter + 'static,
    {
        let name = model_name.into();
        if name.trim().is_empty() {
            return Err(Error::Configuration("model name must not be empty".into()));
        }
        if self.registrations.iter().any(|r| r.name == name) {
            return Err(Error::Configuration(format!(
                "model `{}` is already registered",
                name
            )));
        }

        tracing::debug!(model = %name, "registered model adapter");
        self.registrations.push(Registration {
            name,
            adapter: Box::new(adapter),
        });
        Ok(())
    }

    /// Registered model names in registration order.
    pub fn model_names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run `operations` against every registered adapter.
    ///
    /// Each (operation, model) pair yields exactly one report entry, unless
    /// the run stops early through cancellation or `continue_on_error =
    /// false`. Adapters are opened at the start and closed at the end of the
    /// run on every exit path.
    pub async fn run(&mut self, operations: &[OperationSpec], options: &RunOptions) -> Result<Report> {
        if self.registrations.is_empty() {
            self.state = DriverState::Failed;
            return Err(Error::Configuration("no model adapters registered".into()));
        }

        self.state = DriverState::Running;
        let started = Instant::now();
        let timer = Timer::new(options.per_operation_timeout);
        let mut report = Report::begin();

        tracing::info!(
            operations = operations.len(),
            models = self.registrations.len(),
            timeout = ?options.per_operation_timeout,
            continue_on_error = options.continue_on_error,
            "benchmark run starting"
        );

        let availability = self.open_all().await;
        let status = self
            .execute_all(operations, options, &timer, &availability, &mut report)
            .await;
        self.close_all(&availability).await;

        let report = report.finish(status, started.elapsed());
        self.state = match status {
            RunStatus::Failed => DriverState::Failed,
            RunStatus::Completed | RunStatus::Cancelled => DriverState::Completed,
        };

        tracing::info!(
            status = ?status,
            results = report.len(),
            errors = report.error_count(),
            elapsed = ?report.elapsed(),
            "benchmark run finished"
        );
        Ok(report)
    }

    /// Open every adapter. `None` marks an adapter that opened successfully.
    async fn open_all(&mut self) -> Vec<Option<AdapterError>> {
        let mut availability = Vec::with_capacity(self.registrations.len());
        for registration in &mut self.registrations {
            match registration.adapter.open().await {
                Ok(()) => {
                    tracing::debug!(model = %registration.name, "model adapter opened");
                    availability.push(None);
                }
                Err(err) => {
                    tracing::warn!(model = %registration.name, error = %err, "failed to open model adapter");
                    availability.push(Some(err));
                }
            }
        }
        availability
    }

    async fn execute_all(
        &mut self,
        operations: &[OperationSpec],
        options: &RunOptions,
        timer: &Timer,
        availability: &[Option<AdapterError>],
        report: &mut Report,
    ) -> RunStatus {
        for (index, op) in operations.iter().enumerate() {
            for (slot, registration) in self.registrations.iter_mut().enumerate() {
                if self.cancel.is_cancelled() {
                    tracing::info!(operation = index, "benchmark run cancelled");
                    return RunStatus::Cancelled;
                }

                let result = match &availability[slot] {
                    None => {
                        timer
                            .measure(op.kind(), &registration.name, registration.adapter.execute(op))
                            .await
                    }
                    Some(open_err) => {
                        let err = AdapterError::Unavailable(open_err.to_string());
                        timer
                            .measure(op.kind(), &registration.name, std::future::ready(Err(err)))
                            .await
                    }
                };

                let failed = match result.error() {
                    Some(err) => {
                        tracing::warn!(
                            model = %registration.name,
                            operation = index,
                            kind = %op.kind(),
                            target = %op.target(),
                            error = %err,
                            "operation failed"
                        );
                        true
                    }
                    None => {
                        tracing::debug!(
                            model = %registration.name,
                            operation = index,
                            kind = %op.kind(),
                            count = result.count().unwrap_or_default(),
                            duration = ?result.duration(),
                            "operation executed"
                        );
                        false
                    }
                };
                report.push(result);

                if failed && !options.continue_on_error {
                    return RunStatus::Failed;
                }
            }

            // Adapters rarely yield; give signal handlers a chance to run.
            tokio::task::yield_now().await;
        }
        RunStatus::Completed
    }

    async fn close_all(&mut self, availability: &[Option<AdapterError>]) {
        for (registration, open_err) in self.registrations.iter_mut().zip(availability) {
            if open_err.is_some() {
                continue;
            }
            if let Err(err) = registration.adapter.close().await {
                tracing::warn!(model = %registration.name, error = %err, "failed to close model adapter");
            }
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Outcome;
    use crate::operation::{Field, Predicate, Target};
    use async_trait::async_trait;

    struct Fixed(u64);

    #[async_trait]
    impl ModelAdapter for Fixed {
        async fn execute(&mut self, _op: &OperationSpec) -> std::result::Result<Outcome, AdapterError> {
            Ok(Outcome::new(self.0))
        }
    }

    fn ops() -> Vec<OperationSpec> {
        vec![
            OperationSpec::create(Target::invoice("1"), [(Field::Amount, 10)]).unwrap(),
            OperationSpec::read(Target::invoice("1"), Predicate::target()).unwrap(),
        ]
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut driver = Driver::new();
        driver.register("relational", Fixed(1)).unwrap();
        let err = driver.register("relational", Fixed(2)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(driver.model_names(), vec!["relational"]);
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let mut driver = Driver::new();
        assert!(matches!(
            driver.register("  ", Fixed(1)),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_run_without_adapters_fails() {
        let mut driver = Driver::new();
        let err = driver.run(&ops(), &RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(driver.state(), DriverState::Failed);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let mut driver = Driver::new();
        driver.register("a", Fixed(1)).unwrap();
        assert_eq!(driver.state(), DriverState::Idle);

        let report = driver.run(&ops(), &RunOptions::default()).await.unwrap();
        assert_eq!(driver.state(), DriverState::Completed);
        assert_eq!(report.status(), RunStatus::Completed);
        assert_eq!(report.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_workload_completes() {
        let mut driver = Driver::new();
        driver.register("a", Fixed(1)).unwrap();
        let report = driver.run(&[], &RunOptions::default()).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut driver = Driver::new().with_cancellation(token);
        driver.register("a", Fixed(1)).unwrap();

        let report = driver.run(&ops(), &RunOptions::default()).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.status(), RunStatus::Cancelled);
        assert_eq!(driver.state(), DriverState::Completed);
    }
}
