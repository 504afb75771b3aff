use std::future::Future;
use std::time::Duration;

use jobguard_core::{AppError, AppResult};
use tracing::warn;

/// Default total attempts for one data fetch.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_RETRY_FIRST_DELAY: Duration = Duration::from_secs(1);
/// Default growth factor between retries.
pub const DEFAULT_RETRY_MULTIPLIER: u32 = 2;
/// Default cap on one retry delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded exponential backoff for transient port failures.
///
/// The delay after failed attempt `n` (1-based) is
/// `first_delay * multiplier^(n - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    first_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            first_delay: DEFAULT_RETRY_FIRST_DELAY,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a validated retry policy.
    pub fn new(
        max_attempts: u32,
        first_delay: Duration,
        multiplier: u32,
        max_delay: Duration,
    ) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::Validation(
                "retry max_attempts must be greater than zero".to_owned(),
            ));
        }

        if multiplier == 0 {
            return Err(AppError::Validation(
                "retry multiplier must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            max_attempts,
            first_delay,
            multiplier,
            max_delay: max_delay.max(first_delay),
        })
    }

    /// Policy that never retries.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns the total number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay to wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.first_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Runs `operation`, retrying transient failures until attempts run out.
    ///
    /// Non-transient errors and the error of the last attempt are returned
    /// unchanged.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0_u32;

        loop {
            attempt = attempt.saturating_add(1);

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
