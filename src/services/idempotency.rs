use crate::domain::errors::{ErrorBody, FlowResult, OrderFlowError};
use crate::domain::ports::atomic_store::AtomicStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Deduplicates retried and duplicate requests by fingerprint.
///
/// A fingerprint moves `pending -> completed` exactly once. Concurrent
/// requests that hit a pending record are told to retry later instead of
/// re-executing; requests that hit a completed record get the cached
/// outcome back, which is what makes a client retry of a
/// succeeded-but-ack-lost request safe.
///
/// Each record remembers the digest of the payload it was created for.
/// A request that reuses a fingerprint with a different digest is a
/// key-reuse mistake and is rejected, never answered from the cache.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn AtomicStore>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum IdempotencyRecord {
    Pending { owner: String, digest: String },
    Completed { digest: String, outcome: Outcome },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum Outcome {
    Ok { body: serde_json::Value },
    Err { body: ErrorBody },
}

/// A fresh or replayed success.
pub struct Resolution<T> {
    pub value: T,
    pub replayed: bool,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self { store }
    }

    pub async fn execute<T, F, Fut>(
        &self,
        fingerprint: &str,
        digest: &str,
        ttl: Duration,
        op: F,
    ) -> FlowResult<Resolution<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlowResult<T>>,
    {
        let key = record_key(fingerprint);
        let pending = IdempotencyRecord::Pending {
            owner: Uuid::new_v4().to_string(),
            digest: digest.to_string(),
        };
        let pending_json = encode(&pending)?;

        if self.store.set_if_absent(&key, &pending_json, ttl).await? {
            return self.run_fresh(&key, &pending_json, digest, ttl, op).await;
        }

        match self.store.get(&key).await? {
            Some(raw) => match decode(&raw)? {
                IdempotencyRecord::Pending { digest: recorded, .. } => {
                    if recorded != digest {
                        return Err(OrderFlowError::IdempotencyKeyReuse);
                    }
                    tracing::debug!("Duplicate in flight for fingerprint {}", fingerprint);
                    Err(OrderFlowError::DuplicateInFlight)
                }
                IdempotencyRecord::Completed { digest: recorded, outcome } => {
                    if recorded != digest {
                        return Err(OrderFlowError::IdempotencyKeyReuse);
                    }
                    metrics::counter!("checkout_idempotent_replays_total").increment(1);
                    match outcome {
                        Outcome::Ok { body } => Ok(Resolution {
                            value: serde_json::from_value(body).map_err(|e| {
                                OrderFlowError::Unclassified(format!(
                                    "Corrupt idempotency record: {}",
                                    e
                                ))
                            })?,
                            replayed: true,
                        }),
                        Outcome::Err { body } => Err(body.into_flow_error()),
                    }
                }
            },
            // Record expired between the failed insert and the read; the
            // caller retries and will claim it as novel.
            None => Err(OrderFlowError::DuplicateInFlight),
        }
    }

    async fn run_fresh<T, F, Fut>(
        &self,
        key: &str,
        pending_json: &str,
        digest: &str,
        ttl: Duration,
        op: F,
    ) -> FlowResult<Resolution<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlowResult<T>>,
    {
        match op().await {
            Ok(value) => {
                let outcome = Outcome::Ok {
                    body: serde_json::to_value(&value).map_err(|e| {
                        OrderFlowError::Unclassified(format!("Result serialization: {}", e))
                    })?,
                };
                let completed = encode(&IdempotencyRecord::Completed {
                    digest: digest.to_string(),
                    outcome,
                })?;
                self.store.put(key, &completed, ttl).await?;
                Ok(Resolution {
                    value,
                    replayed: false,
                })
            }
            Err(err) if is_cacheable_failure(&err) => {
                // Terminal business outcome: replaying it is correct and
                // avoids re-running the operation for the same request.
                let completed = encode(&IdempotencyRecord::Completed {
                    digest: digest.to_string(),
                    outcome: Outcome::Err {
                        body: ErrorBody::from(&err),
                    },
                })?;
                self.store.put(key, &completed, ttl).await?;
                Err(err)
            }
            Err(err) => {
                // Transient failure: clear our pending marker so a retry of
                // the same fingerprint can execute. Only our own marker is
                // deleted; a concurrent takeover after expiry stays intact.
                if !self.store.compare_and_delete(key, pending_json).await? {
                    tracing::debug!("Pending marker for {} already replaced", key);
                }
                Err(err)
            }
        }
    }
}

fn record_key(fingerprint: &str) -> String {
    format!("idem:{}", fingerprint)
}

fn encode(record: &IdempotencyRecord) -> FlowResult<String> {
    serde_json::to_string(record)
        .map_err(|e| OrderFlowError::Unclassified(format!("Record serialization: {}", e)))
}

fn decode(raw: &str) -> FlowResult<IdempotencyRecord> {
    serde_json::from_str(raw)
        .map_err(|e| OrderFlowError::Unclassified(format!("Corrupt idempotency record: {}", e)))
}

/// Business-rule outcomes are cached verbatim; contention and capacity
/// failures are not, so a later retry can succeed.
fn is_cacheable_failure(err: &OrderFlowError) -> bool {
    matches!(
        err,
        OrderFlowError::InsufficientStock { .. }
            | OrderFlowError::InsufficientBalance
            | OrderFlowError::PromoExhausted { .. }
    )
}
