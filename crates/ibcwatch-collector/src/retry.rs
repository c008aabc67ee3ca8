//! Fixed-delay retry for individual chain calls.

use ibcwatch_chain::{ChainError, Result};
use ibcwatch_types::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bounded attempts with a fixed pause between them.
///
/// Only retryable errors ([`ChainError::is_retryable`]) are attempted again;
/// anything else is returned as is. Once the budget is spent the last failure
/// is wrapped in [`ChainError::Exhausted`]. Cancellation wins over everything,
/// including the pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts,
            delay: config.delay(),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Run `call` until it succeeds, fails permanently, runs out of attempts or
    /// `cancel` fires. `what` names the call in logs.
    pub async fn run<T, F, Fut>(&self, what: &str, cancel: &CancellationToken, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let budget = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChainError::Cancelled),
                result = call() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= budget {
                warn!(call = what, attempts = attempt, error = %err, "Retries exhausted");
                return Err(ChainError::Exhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            debug!(call = what, attempt, error = %err, "Call failed, retrying");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChainError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}
