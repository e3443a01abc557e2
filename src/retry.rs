use crate::config::RetryConfig;
use crate::error::Error;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry with exponential backoff and a deadline on every attempt.
///
/// One policy object is shared by all agents that call external services.
/// An attempt that exceeds `call_timeout` fails with [`Error::Timeout`] and
/// counts against `max_attempts` like any other failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub call_timeout: Duration,
}

/// The error from the last attempt, plus how many attempts were made.
#[derive(Debug)]
pub struct Failure {
    pub error: Error,
    pub attempts: u32,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt", self.error, self.attempts)?;
        if self.attempts != 1 {
            write!(f, "s")?;
        }
        write!(f, ")")
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            call_timeout,
        }
    }

    pub fn from_config(config: &RetryConfig, call_timeout: Duration) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            call_timeout,
        )
    }

    /// Backoff before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, a non-retryable error occurs, or the
    /// attempts run out.
    pub async fn run<T, F, Fut, R>(
        &self,
        operation: &str,
        call: F,
        retryable: R,
    ) -> std::result::Result<T, Failure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
        R: Fn(&Error) -> bool,
    {
        self.run_until(&CancellationToken::new(), operation, call, retryable)
            .await
    }

    /// Like [`RetryPolicy::run`], but no new attempt starts once `cancel`
    /// fires. An attempt already in flight runs to completion or timeout.
    pub async fn run_until<T, F, Fut, R>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut call: F,
        retryable: R,
    ) -> std::result::Result<T, Failure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
        R: Fn(&Error) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut hint: Option<Duration> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = hint
                    .take()
                    .map_or_else(|| self.delay_before(attempt - 1), |h| h.min(self.max_delay));
                debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                debug!(operation, attempt, "cancelled before attempt");
                return Err(Failure {
                    error: Error::Cancelled,
                    attempts: attempt - 1,
                });
            }

            let outcome = match timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(operation, self.call_timeout)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) if attempt < max_attempts && retryable(&error) => {
                    warn!(operation, attempt, error = %error, "transient failure, will retry");
                    if let Error::RateLimit {
                        retry_after_secs: Some(secs),
                        ..
                    } = &error
                    {
                        hint = Some(Duration::from_secs(*secs).max(self.delay_before(attempt)));
                    }
                }
                Err(error) => {
                    if retryable(&error) {
                        warn!(operation, attempts = attempt, error = %error, "retries exhausted");
                    }
                    return Err(Failure {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }

        Err(Failure {
            error: Error::internal(format!("{operation}: no attempts made")),
            attempts: 0,
        })
    }
}
