//! Per-call execution results.

use std::time::Duration;

use crate::adapter::{AdapterError, Outcome, Plan};
use crate::operation::OperationKind;

/// What happened when one adapter executed one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success { count: u64, plan: Option<Plan> },
    Failure(AdapterError),
}

impl From<Result<Outcome, AdapterError>> for ExecutionOutcome {
    fn from(result: Result<Outcome, AdapterError>) -> Self {
        match result {
            Ok(outcome) => ExecutionOutcome::Success {
                count: outcome.count,
                plan: outcome.plan,
            },
            Err(err) => ExecutionOutcome::Failure(err),
        }
    }
}

/// One (operation, model) measurement.
///
/// Exactly one of the success fields or the error is populated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    kind: OperationKind,
    model_name: String,
    duration: Duration,
    outcome: ExecutionOutcome,
}

impl ExecutionResult {
    pub fn new(
        kind: OperationKind,
        model_name: impl Into<String>,
        duration: Duration,
        outcome: impl Into<ExecutionOutcome>,
    ) -> Self {
        Self {
            kind,
            model_name: model_name.into(),
            duration,
            outcome: outcome.into(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Elapsed time measured on a monotonic clock.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn outcome(&self) -> &ExecutionOutcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Success { .. })
    }

    /// Rows or documents returned or affected. `None` on failure.
    pub fn count(&self) -> Option<u64> {
        match &self.outcome {
            ExecutionOutcome::Success { count, .. } => Some(*count),
            ExecutionOutcome::Failure(_) => None,
        }
    }

    /// Raw execution plan, when the adapter captured one.
    pub fn plan(&self) -> Option<&Plan> {
        match &self.outcome {
            ExecutionOutcome::Success { plan, .. } => plan.as_ref(),
            ExecutionOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&AdapterError> {
        match &self.outcome {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_accessors() {
        let outcome = Outcome::new(3).with_plan(Some(Plan::Text("SCAN invoices".into())));
        let result = ExecutionResult::new(
            OperationKind::Read,
            "relational",
            Duration::from_micros(40),
            Ok(outcome),
        );

        assert!(result.is_success());
        assert_eq!(result.count(), Some(3));
        assert!(result.error().is_none());
        assert_eq!(result.plan(), Some(&Plan::Text("SCAN invoices".into())));
    }

    #[test]
    fn test_failure_accessors() {
        let result = ExecutionResult::new(
            OperationKind::Delete,
            "doc_txn",
            Duration::ZERO,
            Err::<Outcome, _>(AdapterError::NotOpen),
        );

        assert!(!result.is_success());
        assert_eq!(result.count(), None);
        assert!(result.plan().is_none());
        assert_eq!(result.error(), Some(&AdapterError::NotOpen));
    }
}
