//! Retry with linear backoff for connection failures
//!
//! Only connection-class errors are retried. Everything else, including a
//! breaker rejection, is returned after the first attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RouterError};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries)
    pub max_retries: u32,

    /// Delay before the first retry; retry `n` waits `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryConfig {{ max_retries: {}, base_delay: {:?} }}",
            self.max_retries, self.base_delay
        )
    }
}

/// Executor for retry operations with linear backoff
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with the specified configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.config.base_delay.saturating_mul(retry)
    }

    /// Execute a fallible operation with retries according to the configuration.
    ///
    /// A final error that needed more than one attempt carries the attempt count
    /// as context.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.execute_counted(operation).await {
            (Ok(value), _) => Ok(value),
            (Err(err), attempts) if attempts > 1 => Err(err.with_context_value("attempts", attempts)),
            (Err(err), _) => Err(err),
        }
    }

    /// Like [`RetryExecutor::execute`], also reporting how many attempts were made
    pub async fn execute_counted<F, Fut, T>(&self, mut operation: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => return (Ok(value), attempts),
                Err(err) if self.should_retry(&err) && attempts <= self.config.max_retries => {
                    let delay = self.delay_for(attempts);
                    warn!(
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed with retryable error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return (Err(err), attempts),
            }
        }
    }

    fn should_retry(&self, error: &RouterError) -> bool {
        error.is_retryable()
    }

    /// Get the current retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
