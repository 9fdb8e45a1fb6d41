use crate::domain::errors::FlowResult;
use async_trait::async_trait;

/// A resource mutated only through versioned conditional writes: stock
/// quantities, account balances, promo usage counts. Direct unconditioned
/// writes are not part of the interface on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    pub id: String,
    pub value: i64,
    pub version: i64,
}

#[async_trait]
pub trait VersionedStore: Send + Sync {
    async fn read(&self, id: &str) -> FlowResult<Option<VersionedRecord>>;

    /// Write `value` only if the stored version still equals
    /// `expected_version`; a successful write increments the version by one.
    /// Returns false when another writer won the race.
    async fn write_if(&self, id: &str, expected_version: i64, value: i64) -> FlowResult<bool>;
}
