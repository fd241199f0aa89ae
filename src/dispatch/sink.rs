//! Destinations for asynchronous operation failures

use crate::Error;

/// Receives every error produced by a dispatched operation.
///
/// Called from the completing task, concurrently with other completions.
pub trait FailureSink: Send + Sync {
    fn record_failure(&self, index: u64, error: Error);
}

impl<F> FailureSink for F
where
    F: Fn(u64, Error) + Send + Sync,
{
    fn record_failure(&self, index: u64, error: Error) {
        self(index, error)
    }
}

/// Logs each failure at `warn` level
#[derive(Debug, Clone, Copy)]
pub struct LogFailures {
    phase: &'static str,
}

impl LogFailures {
    pub fn new(phase: &'static str) -> Self {
        Self { phase }
    }
}

impl FailureSink for LogFailures {
    fn record_failure(&self, index: u64, error: Error) {
        tracing::warn!(phase = self.phase, index, error = %error, "Operation failed");
    }
}
