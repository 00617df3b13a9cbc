//! Bounded retry with exponential backoff for fallible start operations.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Retry policy for server start attempts.
///
/// `max_retries` counts attempts *after* the first one, so the total number of
/// tries is `max_retries + 1`. The delay before retry `i` (0-indexed) is
/// `base_delay * multiplier^i`, clamped to `max_delay`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use siteherd::retry::RetryPolicy;
///
/// let policy = RetryPolicy {
///     max_retries: 3,
///     base_delay: Duration::from_millis(100),
///     multiplier: 2.0,
///     max_delay: Duration::from_secs(10),
/// };
///
/// assert_eq!(policy.delay_for(0), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(1), Duration::from_millis(200));
/// // 100ms * 2^10 = 102.4s, capped at max_delay
/// assert_eq!(policy.delay_for(10), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (total tries = `max_retries + 1`).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplicative growth factor applied per retry.
    pub multiplier: f64,
    /// Cap on the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Compute the backoff delay preceding retry `attempt` (0-indexed).
    ///
    /// The base delay is derived purely from the attempt number, so jittery
    /// wall-clock timings never feed back into subsequent delays. Non-finite
    /// or negative intermediate values clamp to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let unclamped = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();

        if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_secs {
            self.max_delay
        } else {
            Duration::from_secs_f64(unclamped)
        }
    }

    /// Execute `op` up to `max_retries + 1` times with backoff between tries.
    ///
    /// The operation receives the current attempt index (0-indexed) so callers
    /// can surface the consumed attempt count while the sequence is running.
    /// Failed attempts before the last are logged and swallowed; the final
    /// failure propagates unchanged. On success, returns the value together
    /// with the number of failures that preceded it.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(err) if attempt >= self.max_retries => {
                    tracing::error!(
                        "'{}' failed after {} attempt(s): {}",
                        label,
                        attempt + 1,
                        err
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "'{}' attempt {} failed: {}. Retrying in {:?}",
                        label,
                        attempt + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
