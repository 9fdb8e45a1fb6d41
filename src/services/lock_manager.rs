use crate::config::ConcurrencySettings;
use crate::domain::errors::{FlowResult, OrderFlowError};
use crate::domain::ports::atomic_store::AtomicStore;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// TTL-bound mutual-exclusion locks over the shared atomic store.
///
/// The TTL is a liveness safety net: if a holder crashes mid-critical-
/// section the record self-expires and another acquirer takes over, so
/// operations guarded by these locks must tolerate a late-finishing
/// previous holder. Acquisition is first-to-win-the-atomic-write, not FIFO.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn AtomicStore>,
}

/// Proof of acquisition. Release requires the handle so only the current
/// holder can delete the record.
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub key: String,
    pub token: String,
}

impl LockManager {
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self { store }
    }

    /// Try to take the lock for `key`, polling with capped exponential
    /// backoff plus jitter until the class lock timeout elapses.
    pub async fn acquire(
        &self,
        key: &str,
        settings: &ConcurrencySettings,
    ) -> FlowResult<LockHandle> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + settings.lock_timeout;
        let mut attempt: u32 = 0;

        loop {
            if self
                .store
                .set_if_absent(&lock_key(key), &token, settings.lock_ttl)
                .await?
            {
                if attempt > 0 {
                    tracing::debug!("Lock {} acquired after {} polls", key, attempt);
                }
                return Ok(LockHandle {
                    key: key.to_string(),
                    token,
                });
            }

            attempt += 1;
            let delay = poll_delay(settings.lock_poll_base_delay, attempt);
            if Instant::now() + delay > deadline {
                metrics::counter!("checkout_lock_timeouts_total").increment(1);
                tracing::warn!("Lock {} not acquired within timeout ({} polls)", key, attempt);
                return Err(OrderFlowError::LockTimeout {
                    key: key.to_string(),
                });
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Conditional delete keyed on the holder token. A mismatch means the
    /// caller is releasing a lock it no longer holds (expired and
    /// reclaimed, or never held) and surfaces as `NotHolder`.
    pub async fn release(&self, handle: LockHandle) -> FlowResult<()> {
        let deleted = self
            .store
            .compare_and_delete(&lock_key(&handle.key), &handle.token)
            .await?;

        if deleted {
            Ok(())
        } else {
            tracing::error!("Attempted to release lock {} without holding it", handle.key);
            Err(OrderFlowError::NotHolder { key: handle.key })
        }
    }
}

fn lock_key(key: &str) -> String {
    format!("lock:{}", key)
}

fn poll_delay(base: Duration, attempt: u32) -> Duration {
    // Exponential up to 16x base, plus up to one base of jitter so
    // contending acquirers spread out instead of polling in lockstep.
    let factor = 1u32 << attempt.min(4);
    let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
    base * factor + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_delay_is_capped_and_jittered() {
        let base = Duration::from_millis(50);
        for attempt in 1..20 {
            let delay = poll_delay(base, attempt);
            assert!(delay >= base);
            assert!(delay <= base * 16 + base);
        }
    }
}
