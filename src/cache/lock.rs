//! Advisory warming lock.
//!
//! A transient marker entry keyed per user that discourages two concurrent
//! warming jobs from duplicating work. Two callers racing right at job start
//! can both acquire it; the lock reduces duplicate work, it does not
//! guarantee exclusivity. If the holder crashes, the TTL expires the marker.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::warn;

use super::backend::CacheBackend;
use super::keys;

pub struct WarmingLock {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl WarmingLock {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Mark warming as in progress for the user. The stored value is the
    /// acquisition timestamp, useful when inspecting a stuck lock by hand.
    pub async fn acquire(&self, user_id: i64) {
        let stamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let result = self
            .backend
            .put(
                &keys::warm_lock_key(user_id),
                Bytes::from(stamp),
                self.ttl,
                &BTreeSet::new(),
            )
            .await;
        if let Err(error) = result {
            warn!(user_id, error = %error, "failed to set warming lock");
        }
    }

    pub async fn release(&self, user_id: i64) {
        if let Err(error) = self.backend.forget(&keys::warm_lock_key(user_id)).await {
            warn!(user_id, error = %error, "failed to clear warming lock");
        }
    }

    /// Whether warming is already in progress for the user.
    ///
    /// Status failures default to "not held" so warming can still proceed;
    /// this signal is advisory, availability wins over correctness here.
    pub async fn is_held(&self, user_id: i64) -> bool {
        match self.backend.has(&keys::warm_lock_key(user_id)).await {
            Ok(held) => held,
            Err(error) => {
                warn!(user_id, error = %error, "warming lock check failed, assuming not held");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory::MemoryBackend;
    use super::*;

    fn lock(backend: Arc<MemoryBackend>) -> WarmingLock {
        WarmingLock::new(backend, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn acquire_release_cycle() {
        let backend = Arc::new(MemoryBackend::new());
        let lock = lock(backend);

        assert!(!lock.is_held(7).await);
        lock.acquire(7).await;
        assert!(lock.is_held(7).await);
        assert!(!lock.is_held(8).await);
        lock.release(7).await;
        assert!(!lock.is_held(7).await);
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_holder_expires_via_ttl() {
        let backend = Arc::new(MemoryBackend::new());
        let lock = lock(backend);

        lock.acquire(7).await;
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(!lock.is_held(7).await);
    }
}
