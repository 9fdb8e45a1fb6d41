use crate::config::ConcurrencySettings;
use crate::domain::errors::{FlowResult, OrderFlowError};
use crate::domain::ports::versioned_store::{VersionedRecord, VersionedStore};
use std::sync::Arc;

/// Versioned conditional update: read the current `{value, version}`, apply
/// the mutation, write only if the version is unchanged. A lost race
/// re-reads and retries with a short fixed backoff; this loop resolves
/// write contention only, transient infrastructure failures belong to the
/// outer retry orchestrator.
pub async fn conditional_update<F>(
    store: &Arc<dyn VersionedStore>,
    id: &str,
    settings: &ConcurrencySettings,
    mutate: F,
) -> FlowResult<VersionedRecord>
where
    F: Fn(i64) -> FlowResult<i64>,
{
    let max_attempts = settings.cas_max_retries + 1;

    for attempt in 1..=max_attempts {
        let current = store
            .read(id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("Resource {} not found", id)))?;

        // Business rejections (negative stock, overdrawn balance) pass
        // through untouched; they are terminal, not contention.
        let next_value = mutate(current.value)?;

        if store.write_if(id, current.version, next_value).await? {
            if attempt >= settings.contention_warn_threshold {
                tracing::warn!(
                    "High contention on {}: update succeeded on attempt {}",
                    id,
                    attempt
                );
                metrics::counter!("checkout_contention_events_total").increment(1);
            }
            return Ok(VersionedRecord {
                id: id.to_string(),
                value: next_value,
                version: current.version + 1,
            });
        }

        tracing::debug!("Version conflict on {} (attempt {})", id, attempt);
        if attempt < max_attempts {
            tokio::time::sleep(settings.cas_backoff).await;
        }
    }

    metrics::counter!("checkout_version_conflicts_exhausted_total").increment(1);
    tracing::warn!(
        "Update of {} exhausted {} attempts under contention",
        id,
        max_attempts
    );
    Err(OrderFlowError::VersionConflictExhausted {
        resource: id.to_string(),
        attempts: max_attempts,
    })
}
