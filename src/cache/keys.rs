//! Cache key and tag construction.
//!
//! Two namespaces live side by side:
//!
//! - `api_response:*` entries written by the response middleware, grouped by
//!   tags (`api`, `endpoint:{pattern}`, `user:{id}`) and invalidated by tag
//!   flushes;
//! - the aggregate namespace (`user:{id}:status_counts`,
//!   `analytics:user:{id}:*`, `static:reference_data`), written by the
//!   warmer and invalidated by direct key deletion on the task write path.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

/// Global tag carried by every cached API response.
pub const API_TAG: &str = "api";

/// Suffix for the stored ETag companion entry.
pub const ETAG_SUFFIX: &str = ":etag";

/// Suffix for the stored Last-Modified companion entry.
pub const LAST_MODIFIED_SUFFIX: &str = ":last_modified";

/// Key of the warmed static reference data entry.
pub const STATIC_REFERENCE_KEY: &str = "static:reference_data";

/// Separator for the key digest input; cannot occur in URL path segments or
/// decoded query components without being escaped away by the router.
const FIELD_SEP: char = '\u{1f}';

/// Endpoint identity derived from a request path.
///
/// Numeric path segments collapse into a `{id}` placeholder in `pattern`
/// (shared by all instances of the endpoint, used for tagging), while the
/// literal ids are retained so distinct resources keep distinct cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointId {
    pub pattern: String,
    pub resource_ids: Vec<String>,
}

impl EndpointId {
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.trim_matches('/');
        let trimmed = trimmed.strip_prefix("api/").unwrap_or(trimmed);

        let mut pattern_segments = Vec::new();
        let mut resource_ids = Vec::new();
        for segment in trimmed.split('/').filter(|segment| !segment.is_empty()) {
            if !segment.is_empty() && segment.bytes().all(|byte| byte.is_ascii_digit()) {
                pattern_segments.push("{id}");
                resource_ids.push(segment.to_string());
            } else {
                pattern_segments.push(segment);
            }
        }

        let pattern = if pattern_segments.is_empty() {
            "root".to_string()
        } else {
            pattern_segments.join("/")
        };

        Self {
            pattern,
            resource_ids,
        }
    }
}

/// Parse a raw query string into a sorted parameter map.
///
/// Sorting is what makes `?a=1&b=2` and `?b=2&a=1` collapse to one key.
/// Repeated parameters keep the last value, matching the upstream router.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

fn user_marker(user_id: Option<i64>) -> String {
    match user_id {
        Some(id) => format!("u{id}"),
        None => "anon".to_string(),
    }
}

/// Deterministic cache key for an API response.
///
/// Pure function of (endpoint identity, sorted params, user identity): the
/// same request always maps to the same key, different users (including the
/// anonymous case) never share one.
pub fn api_response_key(
    endpoint: &EndpointId,
    params: &BTreeMap<String, String>,
    user_id: Option<i64>,
) -> String {
    let marker = user_marker(user_id);

    let mut hasher = Sha256::new();
    hasher.update(endpoint.pattern.as_bytes());
    for id in &endpoint.resource_ids {
        hasher.update(FIELD_SEP.to_string().as_bytes());
        hasher.update(id.as_bytes());
    }
    for (name, value) in params {
        hasher.update(FIELD_SEP.to_string().as_bytes());
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hasher.update(FIELD_SEP.to_string().as_bytes());
    hasher.update(marker.as_bytes());

    let digest = hex::encode(hasher.finalize());
    format!("api_response:{}:{}:{}", endpoint.pattern, marker, digest)
}

pub fn etag_key(base: &str) -> String {
    format!("{base}{ETAG_SUFFIX}")
}

pub fn last_modified_key(base: &str) -> String {
    format!("{base}{LAST_MODIFIED_SUFFIX}")
}

pub fn endpoint_tag(pattern: &str) -> String {
    format!("endpoint:{pattern}")
}

pub fn user_tag(user_id: i64) -> String {
    format!("user:{user_id}")
}

/// Resolve the invalidation tags covering an (endpoint, user) pair.
///
/// Every response carries `api` and its endpoint tag; authenticated
/// responses additionally carry the user tag.
pub fn api_tags(pattern: &str, user_id: Option<i64>) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    tags.insert(API_TAG.to_string());
    tags.insert(endpoint_tag(pattern));
    if let Some(id) = user_id {
        tags.insert(user_tag(id));
    }
    tags
}

// ---------------------------------------------------------------------------
// Aggregate namespace (direct-delete invalidation)
// ---------------------------------------------------------------------------

/// Key of a user's cached status counts.
pub fn status_counts_key(user_id: i64) -> String {
    format!("user:{user_id}:status_counts")
}

/// Key of a user's warmed recent-task summary.
pub fn recent_tasks_key(user_id: i64) -> String {
    format!("user:{user_id}:tasks:recent")
}

/// Key of the warming lock for a user.
pub fn warm_lock_key(user_id: i64) -> String {
    format!("warm_cache_job:user:{user_id}")
}

/// The fixed set of per-user analytics aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsKind {
    Creation,
    Completion,
    Priorities,
    Weekly,
    TimeOfDay,
    Overall,
}

impl AnalyticsKind {
    pub const ALL: [AnalyticsKind; 6] = [
        AnalyticsKind::Creation,
        AnalyticsKind::Completion,
        AnalyticsKind::Priorities,
        AnalyticsKind::Weekly,
        AnalyticsKind::TimeOfDay,
        AnalyticsKind::Overall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsKind::Creation => "creation",
            AnalyticsKind::Completion => "completion",
            AnalyticsKind::Priorities => "priorities",
            AnalyticsKind::Weekly => "weekly",
            AnalyticsKind::TimeOfDay => "time_of_day",
            AnalyticsKind::Overall => "overall",
        }
    }

    pub fn key(&self, user_id: i64) -> String {
        format!("analytics:user:{user_id}:{}", self.as_str())
    }
}
