//! Response cache middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use quizmaster_core::Actor;

use super::backend::CacheHandle;
use super::key::{generate_key, sorted_query_pairs};

/// Largest request/response body the middleware will buffer for hashing or
/// memoization. Bigger payloads simply bypass the cache.
const BUFFER_LIMIT: usize = 2 * 1024 * 1024;

/// Zero-argument predicate that disables caching for a request when true.
pub type BypassPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Per-route state for [`response_cache`].
#[derive(Clone)]
pub struct ResponseCache {
    store: CacheHandle,
    ttl: Duration,
    key_prefix: String,
    unless: Option<BypassPredicate>,
}

impl ResponseCache {
    /// A cache wrapper with the given store and the configured default TTL.
    pub fn new(store: CacheHandle, default_ttl: Duration) -> Self {
        Self {
            store,
            ttl: default_ttl,
            key_prefix: String::new(),
            unless: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Skip caching entirely (no read, no write) whenever `predicate` is true.
    pub fn with_unless(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.unless = Some(Arc::new(predicate));
        self
    }
}

/// Wraps a handler with read-through caching.
///
/// On a hit the handler is never invoked; on a miss (or any store error) the
/// handler runs and its response is memoized only when it is a non-empty 200.
/// Statuses like 201/204/4xx/5xx represent mutations or failures, not stable
/// snapshots, and are never written back.
pub async fn response_cache(
    State(cache): State<ResponseCache>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(unless) = &cache.unless
        && unless()
    {
        return next.run(req).await;
    }

    let actor = req
        .extensions()
        .get::<Actor>()
        .cloned()
        .unwrap_or_default();
    let path = req.uri().path().to_string();
    let query_pairs = sorted_query_pairs(req.uri().query());

    // Only mutating methods contribute a body component to the key.
    let (req, body_bytes) = if is_mutating(req.method()) {
        match buffer_request(req).await {
            Ok(buffered) => buffered,
            Err(response) => return response,
        }
    } else {
        (req, Vec::new())
    };

    let cache_key = format!(
        "{}{}",
        cache.key_prefix,
        generate_key(&actor, &path, &query_pairs, &body_bytes)
    );

    match cache.store.get(&cache_key).await {
        Ok(Some(payload)) => {
            tracing::debug!(key = %cache_key, "cache hit");
            return cached_response(payload);
        }
        Ok(None) => {
            tracing::debug!(key = %cache_key, "cache miss");
        }
        Err(e) => {
            // Degrade to a miss; the live path stays correct.
            tracing::warn!(key = %cache_key, error = %e, "Cache lookup failed");
        }
    }

    let response = next.run(req).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let payload = match to_bytes(body, BUFFER_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %cache_key, error = %e, "Failed to read response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !payload.is_empty()
        && let Err(e) = cache
            .store
            .set(&cache_key, payload.to_vec(), cache.ttl)
            .await
    {
        // Write failures never affect the response.
        tracing::warn!(key = %cache_key, error = %e, "Cache write failed");
    }

    Response::from_parts(parts, Body::from(payload))
}

fn is_mutating(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Read the request body into memory and hand back an equivalent request.
///
/// An unreadable body would fail in the handler as well, so it is rejected
/// here with a 400.
async fn buffer_request(req: Request) -> Result<(Request, Vec<u8>), Response> {
    let (parts, body) = req.into_parts();
    match to_bytes(body, BUFFER_LIMIT).await {
        Ok(bytes) => {
            let vec = bytes.to_vec();
            Ok((Request::from_parts(parts, Body::from(bytes)), vec))
        }
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable request body");
            Err(StatusCode::BAD_REQUEST.into_response())
        }
    }
}

/// A stored payload served back as a fresh 200 JSON response.
fn cached_response(payload: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
