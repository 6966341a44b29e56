//! Tagged API response cache.
//!
//! Two cooperating invalidation mechanisms over one backend:
//!
//! - the `api_response:*` namespace, written by the middleware, grouped by
//!   tags (`api`, `endpoint:{pattern}`, `user:{id}`) and cleared with tag
//!   flushes;
//! - the aggregate namespace (status counts, analytics, static reference
//!   data), written by the warmer and cleared by direct key deletion on the
//!   task write path.

mod backend;
mod config;
mod freshness;
mod invalidation;
pub mod keys;
mod lock;
mod memory;
mod middleware;
mod warmer;

pub use backend::{BackendError, CacheBackend};
pub use config::CacheConfig;
pub use freshness::{compute_etag, http_date, not_modified_since, parse_http_date};
pub use invalidation::{AggregateInvalidator, TaskMutation, TaskMutationKind};
pub use lock::WarmingLock;
pub use memory::MemoryBackend;
pub use middleware::{
    CacheState, CurrentUser, api_response_cache_layer, clear_all_api_cache, clear_endpoint_cache,
};
pub use warmer::{AggregateSource, CacheWarmer, WarmError, WarmKind};
