//! Write-path invalidation of aggregate caches.
//!
//! Task mutations invalidate the owning user's status-count and analytics
//! entries synchronously, by direct key deletion. This is deliberately a
//! separate mechanism from the tag flushes covering the `api_response:*`
//! namespace: any new entity mutation path must keep both in sync.

use std::sync::Arc;

use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::keys::{self, AnalyticsKind};

/// What happened to a task on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMutationKind {
    Created,
    Updated,
    Deleted,
}

/// A committed task mutation, published by the task service after the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMutation {
    pub kind: TaskMutationKind,
    pub task_id: i64,
    pub owner_id: i64,
    /// Set on updates that moved the task to another user.
    pub previous_owner_id: Option<i64>,
}

/// Deletes aggregate cache entries in response to task mutations.
pub struct AggregateInvalidator {
    backend: Arc<dyn CacheBackend>,
}

impl AggregateInvalidator {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Invalidate the aggregates of every user the mutation touched.
    ///
    /// Runs synchronously on the write path; backend failures are logged and
    /// swallowed, the TTL bounds any resulting staleness.
    pub async fn task_mutated(&self, mutation: &TaskMutation) {
        debug!(
            kind = ?mutation.kind,
            task_id = mutation.task_id,
            owner_id = mutation.owner_id,
            "invalidating aggregate caches"
        );

        self.invalidate_user(mutation.owner_id).await;

        // A reassigned task must not leave stale aggregates behind for the
        // user it no longer belongs to.
        if let Some(previous) = mutation.previous_owner_id
            && previous != mutation.owner_id
        {
            self.invalidate_user(previous).await;
        }
    }

    async fn invalidate_user(&self, user_id: i64) {
        self.forget(&keys::status_counts_key(user_id)).await;
        self.forget(&keys::recent_tasks_key(user_id)).await;
        for kind in AnalyticsKind::ALL {
            self.forget(&kind.key(user_id)).await;
        }
    }

    async fn forget(&self, key: &str) {
        if let Err(error) = self.backend.forget(key).await {
            warn!(key, error = %error, "aggregate invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use bytes::Bytes;

    use super::super::memory::MemoryBackend;
    use super::*;

    async fn seed_user(backend: &MemoryBackend, user_id: i64) {
        let ttl = Duration::from_secs(600);
        let tags = BTreeSet::new();
        backend
            .put(&keys::status_counts_key(user_id), Bytes::from("{}"), ttl, &tags)
            .await
            .expect("put");
        backend
            .put(&keys::recent_tasks_key(user_id), Bytes::from("[]"), ttl, &tags)
            .await
            .expect("put");
        for kind in AnalyticsKind::ALL {
            backend
                .put(&kind.key(user_id), Bytes::from("{}"), ttl, &tags)
                .await
                .expect("put");
        }
    }

    #[tokio::test]
    async fn create_invalidates_the_owner() {
        let backend = Arc::new(MemoryBackend::new());
        seed_user(&backend, 5).await;
        seed_user(&backend, 9).await;

        let invalidator = AggregateInvalidator::new(backend.clone());
        invalidator
            .task_mutated(&TaskMutation {
                kind: TaskMutationKind::Created,
                task_id: 1,
                owner_id: 5,
                previous_owner_id: None,
            })
            .await;

        assert!(!backend.has(&keys::status_counts_key(5)).await.expect("has"));
        assert!(
            !backend
                .has(&AnalyticsKind::Weekly.key(5))
                .await
                .expect("has")
        );
        // The other user's aggregates are untouched.
        assert!(backend.has(&keys::status_counts_key(9)).await.expect("has"));
    }

    #[tokio::test]
    async fn reassignment_invalidates_both_owners() {
        let backend = Arc::new(MemoryBackend::new());
        seed_user(&backend, 5).await;
        seed_user(&backend, 9).await;

        let invalidator = AggregateInvalidator::new(backend.clone());
        invalidator
            .task_mutated(&TaskMutation {
                kind: TaskMutationKind::Updated,
                task_id: 1,
                owner_id: 9,
                previous_owner_id: Some(5),
            })
            .await;

        for user in [5_i64, 9] {
            assert!(
                !backend
                    .has(&keys::status_counts_key(user))
                    .await
                    .expect("has")
            );
            for kind in AnalyticsKind::ALL {
                assert!(!backend.has(&kind.key(user)).await.expect("has"));
            }
        }
    }

    #[tokio::test]
    async fn delete_invalidates_the_full_analytics_set() {
        let backend = Arc::new(MemoryBackend::new());
        seed_user(&backend, 5).await;

        let invalidator = AggregateInvalidator::new(backend.clone());
        invalidator
            .task_mutated(&TaskMutation {
                kind: TaskMutationKind::Deleted,
                task_id: 1,
                owner_id: 5,
                previous_owner_id: None,
            })
            .await;

        assert!(backend.is_empty().await);
    }
}
