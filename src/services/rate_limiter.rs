use crate::domain::errors::OrderFlowError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Fixed-window request limiter keyed by actor/route.
///
/// Counts attempts per key within a window; over-limit requests are
/// rejected, never queued. Per server instance by design: this sheds load
/// in front of the lock and store, it is not a global quota.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, Window>>>,
    window_duration: Duration,
    max_requests: u32,
}

struct Window {
    started_at: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(window_duration: Duration, max_requests: u32) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            window_duration,
            max_requests,
        }
    }

    /// Count one attempt under `key`. Rejects with the time left in the
    /// current window once the limit is reached; the count never exceeds
    /// the limit.
    pub async fn check(&self, key: &str) -> Result<(), OrderFlowError> {
        let mut windows = self.windows.write().await;
        let now = Instant::now();

        let window = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        // Fixed window: reset once the previous one has fully elapsed.
        if now.duration_since(window.started_at) > self.window_duration {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let elapsed = now.duration_since(window.started_at);
            let retry_after = self.window_duration.saturating_sub(elapsed);
            metrics::counter!("checkout_rate_limited_total").increment(1);
            return Err(OrderFlowError::RateLimited {
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Return one previously counted attempt to the current window. Used
    /// by callers whose count policy excludes successful (or failed)
    /// requests, after the outcome is known.
    pub async fn refund(&self, key: &str) {
        let mut windows = self.windows.write().await;
        if let Some(window) = windows.get_mut(key) {
            window.count = window.count.saturating_sub(1);
        }
    }

    /// Drop windows that have fully elapsed, to bound the key map. Meant
    /// to be called periodically from a maintenance task.
    pub async fn cleanup(&self) {
        let mut windows = self.windows.write().await;
        let now = Instant::now();
        windows.retain(|_, w| now.duration_since(w.started_at) <= self.window_duration);
    }
}
