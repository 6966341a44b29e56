//! Cache warming.
//!
//! Pre-populates per-user aggregates, per-user analytics, and static
//! reference data so the first real request after an invalidation does not
//! pay the cold-cache penalty. Data is pulled through [`AggregateSource`];
//! the crate ships a task-backed implementation in `application::tasks`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::tasks::StatusCounts;

use super::backend::{BackendError, CacheBackend};
use super::config::CacheConfig;
use super::keys::{self, AnalyticsKind};

#[derive(Debug, Error)]
pub enum WarmError {
    #[error("failed to load aggregate data: {0}")]
    Source(String),
    #[error("cache backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to serialize warmed value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which sub-caches a warming run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmKind {
    UserData,
    Analytics,
    Static,
}

impl WarmKind {
    pub const ALL: [WarmKind; 3] = [WarmKind::UserData, WarmKind::Analytics, WarmKind::Static];

    pub fn as_str(&self) -> &'static str {
        match self {
            WarmKind::UserData => "user_data",
            WarmKind::Analytics => "analytics",
            WarmKind::Static => "static",
        }
    }
}

/// Supplies the data the warmer stores.
#[async_trait]
pub trait AggregateSource: Send + Sync {
    async fn status_counts(&self, user_id: i64) -> Result<StatusCounts, WarmError>;

    async fn recent_tasks(&self, user_id: i64) -> Result<Value, WarmError>;

    async fn analytics(&self, user_id: i64, kind: AnalyticsKind) -> Result<Value, WarmError>;

    /// Global reference data shared by every user (statuses, priorities).
    async fn reference_data(&self) -> Result<Value, WarmError>;
}

pub struct CacheWarmer {
    backend: Arc<dyn CacheBackend>,
    source: Arc<dyn AggregateSource>,
    config: CacheConfig,
}

impl CacheWarmer {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        source: Arc<dyn AggregateSource>,
        config: CacheConfig,
    ) -> Self {
        Self {
            backend,
            source,
            config,
        }
    }

    /// Warm the requested sub-caches for a user, in the given order.
    ///
    /// Sub-steps share the job's fate: the first failure surfaces as the
    /// run's failure, there is no per-step isolation.
    pub async fn warm_user(&self, user_id: i64, kinds: &[WarmKind]) -> Result<(), WarmError> {
        let started = Instant::now();
        info!(user_id, kinds = ?kinds, "warming caches");

        for kind in kinds {
            let step_started = Instant::now();
            match kind {
                WarmKind::UserData => self.warm_user_data(user_id).await?,
                WarmKind::Analytics => self.warm_analytics(user_id).await?,
                WarmKind::Static => self.warm_static().await?,
            }
            info!(
                user_id,
                step = kind.as_str(),
                elapsed_ms = step_started.elapsed().as_millis() as u64,
                "warm step completed"
            );
        }

        info!(
            user_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache warm completed"
        );
        Ok(())
    }

    /// Whether the static reference data is already cached.
    ///
    /// Failures default to "not cached" so a flaky backend cannot block
    /// warming; the worst case is a redundant rewrite.
    pub async fn is_static_data_cached(&self) -> bool {
        match self.backend.has(keys::STATIC_REFERENCE_KEY).await {
            Ok(cached) => cached,
            Err(error) => {
                warn!(error = %error, "static cache check failed, assuming cold");
                false
            }
        }
    }

    async fn warm_user_data(&self, user_id: i64) -> Result<(), WarmError> {
        let counts = self.source.status_counts(user_id).await?;
        self.put_json(
            &keys::status_counts_key(user_id),
            &serde_json::to_value(counts)?,
            self.config.aggregate_ttl(),
        )
        .await?;

        let recent = self.source.recent_tasks(user_id).await?;
        self.put_json(
            &keys::recent_tasks_key(user_id),
            &recent,
            self.config.aggregate_ttl(),
        )
        .await
    }

    async fn warm_analytics(&self, user_id: i64) -> Result<(), WarmError> {
        for kind in AnalyticsKind::ALL {
            let value = self.source.analytics(user_id, kind).await?;
            self.put_json(&kind.key(user_id), &value, self.config.aggregate_ttl())
                .await?;
        }
        Ok(())
    }

    async fn warm_static(&self) -> Result<(), WarmError> {
        if self.is_static_data_cached().await {
            info!("static reference data already warm, skipping");
            return Ok(());
        }

        let value = self.source.reference_data().await?;
        self.put_json(keys::STATIC_REFERENCE_KEY, &value, self.config.static_ttl())
            .await
    }

    async fn put_json(
        &self,
        key: &str,
        value: &Value,
        ttl: std::time::Duration,
    ) -> Result<(), WarmError> {
        let bytes = serde_json::to_vec(value)?;
        self.backend
            .put(key, Bytes::from(bytes), ttl, &BTreeSet::new())
            .await?;
        Ok(())
    }
}
