//! API response cache middleware.
//!
//! Serves conditional 304s from stored freshness metadata, serves cached
//! 200s on a body hit, and populates body + ETag + Last-Modified after a
//! fresh 200. Caching is strictly best-effort: backend failures on the read
//! side degrade to a miss, failures on the write side are logged and
//! swallowed.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::{
    backend::CacheBackend,
    config::CacheConfig,
    freshness,
    keys::{self, EndpointId},
};

/// Authenticated user identity, inserted as a request extension by the host
/// application's auth layer. Absent for anonymous requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

/// Shared state for the response cache middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub backend: Arc<dyn CacheBackend>,
}

/// Middleware entry point; mount with `middleware::from_fn_with_state`.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn api_response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled {
        return next.run(request).await;
    }

    // Only GET responses are memoizable.
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    // Identity-sensitive endpoints never touch the cache.
    let path = request.uri().path().to_string();
    if cache.config.is_excluded(&path) {
        return next.run(request).await;
    }

    let user_id = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| user.0);
    let endpoint = EndpointId::from_path(&path);
    let params = keys::parse_query(request.uri().query().unwrap_or(""));
    let key = keys::api_response_key(&endpoint, &params, user_id);
    let tags = keys::api_tags(&endpoint.pattern, user_id);

    let stored_etag = read_text(cache.backend.as_ref(), &keys::etag_key(&key)).await;
    let stored_last_modified =
        read_text(cache.backend.as_ref(), &keys::last_modified_key(&key)).await;

    if let Some(response) = conditional_response(&cache, &request, &stored_etag, &stored_last_modified)
    {
        debug!(cache = "api_response", outcome = "not_modified", key = %key, "serving 304");
        return response;
    }

    // Body hit without a conditional match: replay the cached response.
    // The body is stored opaque, so no content type is asserted here.
    match cache.backend.get(&key).await {
        Ok(Some(body)) => {
            debug!(cache = "api_response", outcome = "hit", key = %key, "serving cached response");
            let mut response = Response::new(Body::from(body));
            set_freshness_headers(
                &mut response,
                &cache.config,
                stored_etag.as_deref(),
                stored_last_modified.as_deref(),
            );
            return response;
        }
        Ok(None) => {}
        Err(error) => {
            warn!(key = %key, error = %error, "cache read failed, treating as miss");
        }
    }

    debug!(cache = "api_response", outcome = "miss", key = %key, "executing handler");
    let uri = request.uri().to_string();
    let response = next.run(request).await;

    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(error) => {
            warn!(
                cache = "api_response",
                url = %uri,
                error = %error,
                "failed to buffer response body, skipping cache"
            );
            return Response::from_parts(parts, Body::empty());
        }
    };

    let mut response = Response::from_parts(parts, Body::from(bytes.clone()));

    let etag = freshness::compute_etag(&bytes);
    let last_modified = freshness::http_date(OffsetDateTime::now_utc());

    match populate(&cache, &key, &tags, bytes, &etag, &last_modified).await {
        Ok(()) => {
            set_freshness_headers(&mut response, &cache.config, Some(&etag), Some(&last_modified));
        }
        Err(error) => {
            // Best effort: the client still gets the fresh response.
            warn!(
                cache = "api_response",
                url = %uri,
                error = %error,
                "failed to store cached response"
            );
        }
    }

    response
}

/// Flush every cached response for an endpoint, optionally scoped to one
/// user. Returns whether the flush went through.
pub async fn clear_endpoint_cache(
    backend: &dyn CacheBackend,
    endpoint: &str,
    user_id: Option<i64>,
) -> bool {
    let mut tags = std::collections::BTreeSet::new();
    tags.insert(keys::endpoint_tag(endpoint));
    if let Some(id) = user_id {
        tags.insert(keys::user_tag(id));
    }

    match backend.flush_tags(&tags).await {
        Ok(flushed) => flushed,
        Err(error) => {
            warn!(endpoint, error = %error, "endpoint cache flush failed");
            false
        }
    }
}

/// Flush the entire API response cache via the global tag.
pub async fn clear_all_api_cache(backend: &dyn CacheBackend) -> bool {
    let tags = std::iter::once(keys::API_TAG.to_string()).collect();
    match backend.flush_tags(&tags).await {
        Ok(flushed) => flushed,
        Err(error) => {
            warn!(error = %error, "global api cache flush failed");
            false
        }
    }
}

/// Read a small text entry, degrading backend errors to a miss.
async fn read_text(backend: &dyn CacheBackend, key: &str) -> Option<String> {
    match backend.get(key).await {
        Ok(value) => value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) => {
            warn!(key, error = %error, "cache read failed, treating as miss");
            None
        }
    }
}

fn conditional_response(
    cache: &CacheState,
    request: &Request<Body>,
    stored_etag: &Option<String>,
    stored_last_modified: &Option<String>,
) -> Option<Response> {
    if let (Some(etag), Some(if_none_match)) = (
        stored_etag.as_deref(),
        header_str(request, header::IF_NONE_MATCH),
    ) && if_none_match == etag
    {
        return Some(not_modified(
            &cache.config,
            stored_etag.as_deref(),
            stored_last_modified.as_deref(),
        ));
    }

    if let (Some(last_modified), Some(if_modified_since)) = (
        stored_last_modified.as_deref(),
        header_str(request, header::IF_MODIFIED_SINCE),
    ) && freshness::not_modified_since(last_modified, if_modified_since)
    {
        return Some(not_modified(
            &cache.config,
            stored_etag.as_deref(),
            stored_last_modified.as_deref(),
        ));
    }

    None
}

fn header_str<'a>(request: &'a Request<Body>, name: header::HeaderName) -> Option<&'a str> {
    request.headers().get(name).and_then(|value| value.to_str().ok())
}

fn not_modified(
    config: &CacheConfig,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    set_freshness_headers(&mut response, config, etag, last_modified);
    response
}

fn set_freshness_headers(
    response: &mut Response,
    config: &CacheConfig,
    etag: Option<&str>,
    last_modified: Option<&str>,
) {
    let headers = response.headers_mut();
    if let Some(value) = etag.and_then(|etag| HeaderValue::from_str(etag).ok()) {
        headers.insert(header::ETAG, value);
    }
    if let Some(value) = last_modified.and_then(|date| HeaderValue::from_str(date).ok()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&config.cache_control()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

/// Store body + freshness metadata under the shared tag set.
///
/// The three writes are not transactional; a flush racing between them can
/// strand freshness metadata without a body. The TTL bounds that window.
async fn populate(
    cache: &CacheState,
    key: &str,
    tags: &std::collections::BTreeSet<String>,
    body: Bytes,
    etag: &str,
    last_modified: &str,
) -> Result<(), super::backend::BackendError> {
    let ttl = cache.config.response_ttl();
    let backend = cache.backend.as_ref();

    backend.put(key, body, ttl, tags).await?;
    backend
        .put(
            &keys::etag_key(key),
            Bytes::from(etag.to_string()),
            ttl,
            tags,
        )
        .await?;
    backend
        .put(
            &keys::last_modified_key(key),
            Bytes::from(last_modified.to_string()),
            ttl,
            tags,
        )
        .await?;
    Ok(())
}
