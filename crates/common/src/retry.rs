use std::{fmt::Display, time::Duration};
use tracing::warn;

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY: Duration = Duration::from_millis(1000);
pub const MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Exponential backoff: the delay after failed attempt `n` (0-based) is
/// `min(base * 2^n, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay:   Duration,
    pub max_delay:    Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay:   BASE_DELAY,
            max_delay:    MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

pub trait Retryable {
    /// Whether another attempt can help. Errors that prove the peer is down
    /// return `false` and end the loop early.
    fn is_retryable(&self) -> bool {
        true
    }
}

pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() {
            warn!(attempt = attempt + 1, error = %err, "attempt failed, not retryable");
            return Err(err);
        }
        if attempt + 1 >= attempts {
            warn!(attempt = attempt + 1, error = %err, "attempt failed, retry budget exhausted");
            return Err(err);
        }
        let delay = policy.backoff(attempt);
        warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
