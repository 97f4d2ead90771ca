//! Wall-clock measurement of adapter calls.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::adapter::{AdapterError, Outcome};
use crate::operation::OperationKind;
use crate::result::ExecutionResult;

/// Measures single adapter calls on a monotonic clock.
///
/// The stop time is taken however the call ends: success, error or
/// timeout. The timer never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    timeout: Option<Duration>,
}

impl Timer {
    /// Create a timer with an optional per-call timeout.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Await `call` and wrap its result with the elapsed time.
    ///
    /// Calls that yield are cancelled once the timeout elapses. Calls that
    /// run to completion without yielding cannot be interrupted; they are
    /// recorded as timed out when the measured duration exceeds the limit.
    pub async fn measure<F>(
        &self,
        kind: OperationKind,
        model_name: &str,
        call: F,
    ) -> ExecutionResult
    where
        F: Future<Output = Result<Outcome, AdapterError>>,
    {
        let started = Instant::now();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout(limit)),
            },
            None => call.await,
        };
        let duration = started.elapsed();

        let result = match (result, self.timeout) {
            (Ok(_), Some(limit)) if duration > limit => Err(AdapterError::Timeout(limit)),
            (result, _) => result,
        };

        ExecutionResult::new(kind, model_name, duration, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_measure_success() {
        let timer = Timer::default();
        let result = timer
            .measure(OperationKind::Read, "relational", async { Ok(Outcome::new(2)) })
            .await;

        assert_eq!(result.count(), Some(2));
        assert_eq!(result.model_name(), "relational");
        assert_eq!(result.kind(), OperationKind::Read);
    }

    #[tokio::test]
    async fn test_measure_error_is_timed() {
        let timer = Timer::default();
        let result = timer
            .measure(OperationKind::Update, "doc_txn", async {
                tokio::time::sleep(Duration::from_millis(2)).await;
                Err(AdapterError::Engine("disk full".into()))
            })
            .await;

        assert_eq!(result.error(), Some(&AdapterError::Engine("disk full".into())));
        assert!(result.duration() >= Duration::from_millis(2));
    }

    #[tokio::test]
    async fn test_measure_timeout_cancels_pending_call() {
        let limit = Duration::from_millis(10);
        let timer = Timer::new(Some(limit));
        let result = timer
            .measure(OperationKind::Read, "doc_customer", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Outcome::new(1))
            })
            .await;

        assert_eq!(result.error(), Some(&AdapterError::Timeout(limit)));
        assert!(result.duration() >= limit);
        assert!(result.duration() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_measure_blocking_overrun_is_timeout() {
        let limit = Duration::from_millis(1);
        let timer = Timer::new(Some(limit));
        let result = timer
            .measure(OperationKind::Create, "relational", async {
                std::thread::sleep(Duration::from_millis(5));
                Ok(Outcome::new(1))
            })
            .await;

        assert_eq!(result.error(), Some(&AdapterError::Timeout(limit)));
    }
}
