use crate::domain::errors::FlowResult;
use async_trait::async_trait;
use std::time::Duration;

/// Key-value store with atomic conditional writes. Backs the distributed
/// lock and idempotency records. Any store with compare-and-set semantics
/// satisfies this; the SQL implementation lives on `Database`.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Write `value` under `key` only if no live record exists. A record
    /// whose TTL has lapsed counts as absent and may be taken over.
    /// Returns true if the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> FlowResult<bool>;

    /// Fetch the live value under `key`, if any. Expired records read as
    /// absent.
    async fn get(&self, key: &str) -> FlowResult<Option<String>>;

    /// Unconditional write with a fresh TTL.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> FlowResult<()>;

    /// Delete the record only if its current value equals `expected`.
    /// Returns true if a record was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> FlowResult<bool>;
}
