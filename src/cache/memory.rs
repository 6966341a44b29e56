//! In-memory cache backend.
//!
//! A plain map with lazy TTL expiry and a per-entry tag set. Backs tests and
//! single-process deployments; the trait keeps the rest of the cache layer
//! oblivious to the store behind it.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::backend::{BackendError, CacheBackend};

struct Entry {
    value: Bytes,
    expires_at: Instant,
    tags: BTreeSet<String>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.entries.read().await;
        guard.values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        let now = Instant::now();
        {
            let guard = self.entries.read().await;
            match guard.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired entry: drop it on the way out.
        let mut guard = self.entries.write().await;
        if guard.get(key).is_some_and(|entry| entry.is_expired(now)) {
            guard.remove(key);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        tags: &BTreeSet<String>,
    ) -> Result<(), BackendError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
            tags: tags.clone(),
        };
        let mut guard = self.entries.write().await;
        guard.insert(key.to_string(), entry);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn forget(&self, key: &str) -> Result<(), BackendError> {
        let mut guard = self.entries.write().await;
        guard.remove(key);
        Ok(())
    }

    async fn flush_tags(&self, tags: &BTreeSet<String>) -> Result<bool, BackendError> {
        if tags.is_empty() {
            return Ok(false);
        }
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| !tags.iter().all(|tag| entry.tags.contains(tag)));
        Ok(true)
    }
}
