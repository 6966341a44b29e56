//! Cache backend contract.
//!
//! The response cache, warmer, and invalidation hooks all talk to an
//! abstract key/value store with per-key TTLs and group-membership tagging.
//! Production deployments plug in whatever store the host application uses;
//! [`super::MemoryBackend`] covers tests and single-process runs.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend rejected the operation: {0}")]
    Operation(String),
}

/// Key/value store with per-key TTL and tag groups.
///
/// Tag semantics: an entry carries the tag set it was written with;
/// `flush_tags` removes every entry whose tag set contains *all* of the
/// listed tags, so a flush can be scoped to a tag combination.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError>;

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        tags: &BTreeSet<String>,
    ) -> Result<(), BackendError>;

    async fn has(&self, key: &str) -> Result<bool, BackendError>;

    async fn forget(&self, key: &str) -> Result<(), BackendError>;

    /// Flush every entry tagged with all of `tags`. Returns whether the
    /// flush was carried out; flushing an already-empty group succeeds.
    async fn flush_tags(&self, tags: &BTreeSet<String>) -> Result<bool, BackendError>;
}
