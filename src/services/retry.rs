use crate::config::ConcurrencySettings;
use crate::domain::errors::{FlowResult, OrderFlowError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Bounded retry policy for one logical operation. Derived from an
/// operation class's settings; attempt state lives only for the duration
/// of the call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub delay_cap: Duration,
    pub backoff: bool,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_settings(settings: &ConcurrencySettings) -> Self {
        Self {
            max_retries: settings.retry_max,
            base_delay: settings.retry_base_delay,
            delay_cap: settings.retry_delay_cap,
            backoff: settings.retry_backoff,
            jitter: settings.retry_jitter,
        }
    }

    /// Delay before retry number `attempt` (1-based), for the given error.
    /// `min(base * 2^(attempt-1) + jitter, cap)`, raised to the
    /// classifier's floor for slow-recovery kinds.
    pub fn delay_for(&self, attempt: u32, error: &OrderFlowError) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let mut delay_ms = if self.backoff {
            base_ms.saturating_mul(1u64 << (attempt - 1).min(16))
        } else {
            base_ms
        };

        if self.jitter {
            delay_ms += rand::thread_rng().gen_range(0..=base_ms);
        }

        let mut delay = Duration::from_millis(delay_ms).min(self.delay_cap);

        if let Some(floor) = error.retry_class().delay_floor(self.base_delay) {
            delay = delay.max(floor.min(self.delay_cap));
        }

        delay
    }
}

/// Run `op` with bounded retries. The error classifier decides
/// retryability per failure kind; non-retryable failures and exhausted
/// budgets surface the most recent error unchanged. Makes exactly
/// `1 + max_retries` attempts for an always-retryable failure.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, op: F) -> FlowResult<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = FlowResult<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.should_retry() {
                    tracing::debug!("Attempt {} failed terminally: {}", attempt, err);
                    return Err(err);
                }
                let retries_done = attempt - 1;
                if retries_done >= policy.max_retries {
                    tracing::warn!(
                        "Giving up after {} attempts, last error: {}",
                        attempt,
                        err
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(attempt, &err);
                tracing::debug!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    attempt,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
