//! Retry wrapper with exponential backoff

use super::types::{BackendError, BackendExecutor, BackendRequest, BackendResponse};
use crate::config::BackendConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Backoff schedule for retryable backend errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first request
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Upper bound before jitter
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add up to 25% random delay so parallel runs spread out
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let jitter = if self.jitter {
            rand::random::<f64>() * 0.25 * capped
        } else {
            0.0
        };

        Duration::from_secs_f64(capped + jitter)
    }
}

/// Wrapper that adds retry logic to any backend executor
pub struct RetryExecutor<T: BackendExecutor> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: BackendExecutor> RetryExecutor<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: BackendExecutor> BackendExecutor for RetryExecutor<T> {
    async fn execute(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        let mut attempt = 0;

        loop {
            match self.inner.execute(request).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() || attempt >= self.policy.max_retries => {
                    return Err(e);
                }
                Err(e) => {
                    // Prefer the server-specified delay
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));

                    tracing::warn!(
                        backend = self.inner.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "backend request failed, retrying in {:?}",
                        delay
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Create a retry executor with custom policy
pub fn with_retry<T: BackendExecutor>(backend: T, policy: RetryPolicy) -> RetryExecutor<T> {
    RetryExecutor::new(backend, policy)
}
