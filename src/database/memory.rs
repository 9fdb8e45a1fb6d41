//! In-memory implementations of the store ports.
//!
//! Single-instance stand-in only: these maps live in process memory, so
//! they provide no mutual exclusion or deduplication across server
//! instances. Production deployments must back the ports with a shared
//! external store (the `Database` implementations, or an equivalent cache
//! with CAS support). Tests and local development are the intended users.

use crate::domain::errors::FlowResult;
use crate::domain::ports::atomic_store::AtomicStore;
use crate::domain::ports::versioned_store::{VersionedRecord, VersionedStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, AtomicRecord>>,
    versioned: Mutex<HashMap<String, VersionedRecord>>,
}

struct AtomicRecord {
    value: String,
    expires_at: Instant,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a versioned resource (stock level, balance, promo uses).
    pub async fn seed_versioned(&self, id: &str, value: i64) {
        let mut map = self.versioned.lock().await;
        map.insert(
            id.to_string(),
            VersionedRecord {
                id: id.to_string(),
                value,
                version: 1,
            },
        );
    }

    pub async fn snapshot_versioned(&self, id: &str) -> Option<VersionedRecord> {
        self.versioned.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> FlowResult<bool> {
        let mut map = self.records.lock().await;
        let now = Instant::now();

        match map.get(key) {
            Some(existing) if existing.expires_at > now => Ok(false),
            _ => {
                map.insert(
                    key.to_string(),
                    AtomicRecord {
                        value: value.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> FlowResult<Option<String>> {
        let map = self.records.lock().await;
        Ok(map
            .get(key)
            .filter(|r| r.expires_at > Instant::now())
            .map(|r| r.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> FlowResult<()> {
        let mut map = self.records.lock().await;
        map.insert(
            key.to_string(),
            AtomicRecord {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> FlowResult<bool> {
        let mut map = self.records.lock().await;
        match map.get(key) {
            Some(existing) if existing.value == expected => {
                map.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn read(&self, id: &str) -> FlowResult<Option<VersionedRecord>> {
        Ok(self.versioned.lock().await.get(id).cloned())
    }

    async fn write_if(&self, id: &str, expected_version: i64, value: i64) -> FlowResult<bool> {
        let mut map = self.versioned.lock().await;
        match map.get_mut(id) {
            Some(record) if record.version == expected_version => {
                record.value = value;
                record.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
