// menu-render-service/src/retry.rs

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Exponential backoff around whole render attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl From<&RenderConfig> for RetryPolicy {
    fn from(config: &RenderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `attempt` until it succeeds or the policy gives up.
    ///
    /// `recover` runs between attempts so the next one starts from a clean
    /// browser. Input and template errors surface untouched; malformed output
    /// gets one more try before the job is declared exhausted.
    pub async fn run<T, A, AF, R, RF>(&self, mut attempt: A, mut recover: R) -> Result<T>
    where
        A: FnMut(u32) -> AF,
        AF: Future<Output = Result<T>>,
        R: FnMut() -> RF,
        RF: Future<Output = ()>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut invalid_outputs = 0u32;
        let mut n = 1u32;

        loop {
            let err = match attempt(n).await {
                Ok(value) => {
                    if n > 1 {
                        info!(attempt = n, "Render succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if matches!(err, RenderError::InvalidInput(_) | RenderError::Template(_)) {
                return Err(err);
            }

            let give_up = if let RenderError::InvalidOutput(_) = err {
                invalid_outputs += 1;
                invalid_outputs > 1 || n >= max_attempts
            } else {
                n >= max_attempts
            };

            if give_up {
                warn!(attempts = n, error = %err, "Giving up on render");
                return Err(RenderError::Exhausted {
                    attempts: n,
                    last: Box::new(err),
                });
            }

            let delay = self.backoff(n);
            warn!(
                attempt = n,
                max_attempts,
                error_type = err.error_type(),
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Render attempt failed, retrying"
            );

            recover().await;
            sleep(delay).await;
            n += 1;
        }
    }
}
