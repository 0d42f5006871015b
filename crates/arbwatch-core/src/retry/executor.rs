use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::RetryPolicy;

/// Runs a fallible async operation under a [`RetryPolicy`].
///
/// The first attempt runs immediately. After a failure the executor stops
/// when the retry budget is spent or the policy rejects the error, and
/// otherwise sleeps for the backoff delay before the next attempt. The last
/// error is returned unchanged so callers can still match on it.
///
/// With a cancellation token attached, the token is checked before every
/// backoff delay and before every retry attempt, and a pending delay is
/// abandoned as soon as it fires. Cancellation also yields the last error.
pub struct RetryExecutor<E> {
    policy: RetryPolicy<E>,
    cancel: Option<CancellationToken>,
}

impl<E: Display> RetryExecutor<E> {
    pub fn new(policy: RetryPolicy<E>) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= self.policy.max_retries {
                error!(attempts = attempt + 1, error = %err, "Operation failed after exhausting retries");
                return Err(err);
            }

            if !self.policy.should_retry(&err) {
                warn!(attempt = attempt + 1, remaining = 0, error = %err, "Error not retryable, giving up");
                return Err(err);
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                attempt = attempt + 1,
                remaining = self.policy.max_retries - attempt,
                next_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Operation failed, retrying"
            );

            if self.is_cancelled() {
                debug!(attempt = attempt + 1, "Retry cancelled before backoff");
                return Err(err);
            }

            self.wait(delay).await;

            // Also observes a cancellation that cut the delay short
            if self.is_cancelled() {
                debug!(attempt = attempt + 1, "Retry cancelled before next attempt");
                return Err(err);
            }

            attempt += 1;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Sleep for `delay`, waking early if cancelled.
    async fn wait(&self, delay: Duration) {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}

impl<E: Display> Default for RetryExecutor<E> {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Retry `operation` with the default policy (3 retries, 1s doubling).
pub async fn retry<T, E, F, Fut>(operation: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryExecutor::default().execute(operation).await
}

/// Retry `operation` under an explicit policy.
pub async fn retry_with<T, E, F, Fut>(policy: RetryPolicy<E>, operation: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryExecutor::new(policy).execute(operation).await
}
