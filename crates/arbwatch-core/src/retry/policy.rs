use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::api::ApiError;

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry, in milliseconds.
const DEFAULT_DELAY_MS: u64 = 1000;

/// Default growth factor applied to the delay on every further retry.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Predicate deciding whether a failure is worth another attempt.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// How often and how patiently an operation is retried.
///
/// An operation runs at most `max_retries + 1` times. The wait after the
/// failed attempt `n` (0-indexed) is `delay * backoff_multiplier^n`,
/// optionally capped by `max_delay`.
pub struct RetryPolicy<E> {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Option<Duration>,
    should_retry: RetryPredicate<E>,
}

impl<E> RetryPolicy<E> {
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: None,
            should_retry: Arc::new(|_| true),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Negative and NaN multipliers are treated as zero.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(0.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn should_retry(&self, error: &E) -> bool {
        (self.should_retry)(error)
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(self.delay.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Total number of times the operation may run.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl RetryPolicy<ApiError> {
    /// Retries only transient API failures (network, timeout, 5xx, 429).
    pub fn transient() -> Self {
        Self::new().with_should_retry(ApiError::is_retryable)
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            delay: self.delay,
            backoff_multiplier: self.backoff_multiplier,
            max_delay: self.max_delay,
            should_retry: Arc::clone(&self.should_retry),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}
