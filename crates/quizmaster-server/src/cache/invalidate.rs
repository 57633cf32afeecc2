//! Cache invalidation middleware for write routes.
//!
//! Invalidation runs strictly after the wrapped handler resolves, so a
//! mutation is durably committed before any entry is deleted. A concurrent
//! reader can still repopulate the cache between the delete and its next
//! read; that eventual-consistency window is bounded by the entry TTL and
//! accepted.

use axum::extract::{RawPathParams, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use super::backend::CacheHandle;

/// Statuses that indicate the handler's mutation committed.
const SUCCESS_STATUSES: [StatusCode; 3] = [
    StatusCode::OK,
    StatusCode::CREATED,
    StatusCode::NO_CONTENT,
];

fn mutation_succeeded(status: StatusCode) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// State for [`invalidate_pattern`].
#[derive(Clone)]
pub struct PatternInvalidation {
    store: CacheHandle,
    pattern: String,
}

impl PatternInvalidation {
    pub fn new(store: CacheHandle, pattern: impl Into<String>) -> Self {
        Self {
            store,
            pattern: pattern.into(),
        }
    }
}

/// After a successful mutation, delete every cache entry matching a pattern.
///
/// Invalidation failures are logged and swallowed: the mutation already
/// committed, and a stale-cache window beats reporting a failure for a write
/// that succeeded.
pub async fn invalidate_pattern(
    State(invalidation): State<PatternInvalidation>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    if mutation_succeeded(response.status()) {
        match invalidation
            .store
            .delete_matching(&invalidation.pattern)
            .await
        {
            Ok(count) => tracing::debug!(
                pattern = %invalidation.pattern,
                count,
                "cache entries invalidated"
            ),
            Err(e) => tracing::warn!(
                pattern = %invalidation.pattern,
                error = %e,
                "Cache invalidation failed"
            ),
        }
    }

    response
}

/// State for [`invalidate_key`].
#[derive(Clone)]
pub struct KeyInvalidation {
    store: CacheHandle,
    /// Template with `{name}` placeholders resolved from path parameters,
    /// e.g. `user_summary:{uid}`.
    key_template: String,
}

impl KeyInvalidation {
    pub fn new(store: CacheHandle, key_template: impl Into<String>) -> Self {
        Self {
            store,
            key_template: key_template.into(),
        }
    }
}

/// After a successful mutation, delete one exact cache key.
pub async fn invalidate_key(
    State(invalidation): State<KeyInvalidation>,
    params: RawPathParams,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    if mutation_succeeded(response.status()) {
        match resolve_template(&invalidation.key_template, params.iter()) {
            Some(key) => {
                if let Err(e) = invalidation.store.delete(&key).await {
                    tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
                } else {
                    tracing::debug!(key = %key, "cache entry invalidated");
                }
            }
            None => tracing::warn!(
                template = %invalidation.key_template,
                "Unresolved placeholder in key template, skipping invalidation"
            ),
        }
    }

    response
}

/// Substitute `{name}` placeholders from path parameters.
///
/// Returns `None` when any placeholder is left unresolved.
fn resolve_template<'a>(
    template: &str,
    params: impl Iterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    let mut key = template.to_string();
    for (name, value) in params {
        key = key.replace(&format!("{{{name}}}"), value);
    }
    if key.contains('{') { None } else { Some(key) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_gate_invalidation() {
        assert!(mutation_succeeded(StatusCode::OK));
        assert!(mutation_succeeded(StatusCode::CREATED));
        assert!(mutation_succeeded(StatusCode::NO_CONTENT));
        assert!(!mutation_succeeded(StatusCode::BAD_REQUEST));
        assert!(!mutation_succeeded(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!mutation_succeeded(StatusCode::ACCEPTED));
    }

    #[test]
    fn template_substitutes_named_params() {
        let params = [("uid", "42")];
        let key = resolve_template("user_summary:{uid}", params.iter().copied());
        assert_eq!(key.as_deref(), Some("user_summary:42"));
    }

    #[test]
    fn unresolved_placeholder_skips_invalidation() {
        let params = [("other", "1")];
        assert!(resolve_template("user_summary:{uid}", params.iter().copied()).is_none());
    }
}
