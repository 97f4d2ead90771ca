//! Run options.

use std::time::Duration;

/// Options for a single benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound for one adapter call. `None` waits indefinitely.
    pub per_operation_timeout: Option<Duration>,

    /// Keep going after an adapter error. When false the run stops at the
    /// first error and the report is marked failed.
    pub continue_on_error: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self {
            per_operation_timeout: None,
            continue_on_error: true,
        }
    }

    /// Set the per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_operation_timeout = Some(timeout);
        self
    }

    /// Remove the per-operation timeout.
    pub fn without_timeout(mut self) -> Self {
        self.per_operation_timeout = None;
        self
    }

    /// Set whether to continue after adapter errors.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Stop at the first adapter error.
    pub fn fail_fast(self) -> Self {
        self.with_continue_on_error(false)
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}
