//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_RESPONSE_TTL_SECONDS: u64 = 600;
const DEFAULT_AGGREGATE_TTL_SECONDS: u64 = 600;
const DEFAULT_STATIC_TTL_SECONDS: u64 = 3600;
const DEFAULT_WARM_LOCK_TTL_SECONDS: u64 = 300;

fn default_excluded_prefixes() -> Vec<String> {
    // Identity-sensitive endpoints must always reflect live session state.
    vec!["/api/auth".to_string(), "/api/user".to_string()]
}

/// Cache behavior knobs, loaded from `taskline.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the API response cache middleware.
    pub enabled: bool,
    /// TTL for cached response bodies and their freshness metadata.
    pub response_ttl_seconds: u64,
    /// TTL for warmed per-user aggregates.
    pub aggregate_ttl_seconds: u64,
    /// TTL for warmed static reference data.
    pub static_ttl_seconds: u64,
    /// TTL bounding a crashed warming job's lock.
    pub warm_lock_ttl_seconds: u64,
    /// Path prefixes that bypass the response cache entirely.
    pub excluded_path_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            response_ttl_seconds: DEFAULT_RESPONSE_TTL_SECONDS,
            aggregate_ttl_seconds: DEFAULT_AGGREGATE_TTL_SECONDS,
            static_ttl_seconds: DEFAULT_STATIC_TTL_SECONDS,
            warm_lock_ttl_seconds: DEFAULT_WARM_LOCK_TTL_SECONDS,
            excluded_path_prefixes: default_excluded_prefixes(),
        }
    }
}

impl CacheConfig {
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_seconds)
    }

    pub fn aggregate_ttl(&self) -> Duration {
        Duration::from_secs(self.aggregate_ttl_seconds)
    }

    pub fn static_ttl(&self) -> Duration {
        Duration::from_secs(self.static_ttl_seconds)
    }

    pub fn warm_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.warm_lock_ttl_seconds)
    }

    /// `Cache-Control` value attached to cached responses.
    pub fn cache_control(&self) -> String {
        format!("private, max-age={}", self.response_ttl_seconds)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
