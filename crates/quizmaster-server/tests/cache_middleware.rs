//! Middleware-level cache contracts, driven through minimal routers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use tower::ServiceExt;

use quizmaster_server::cache::{
    CacheStore, MemoryCache, PatternInvalidation, ResponseCache, invalidate_pattern,
    response_cache,
};

fn cached_router(cache: Arc<MemoryCache>, handler_calls: Arc<AtomicUsize>) -> Router {
    let wrapper = ResponseCache::new(cache, Duration::from_secs(60)).with_key_prefix("views_");
    Router::new()
        .route(
            "/ok",
            get(move || {
                let calls = handler_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"answer": 42}))
                }
            }),
        )
        .route(
            "/created",
            get(|| async { (StatusCode::CREATED, Json(serde_json::json!({"id": 1}))) }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "nope"}))) }),
        )
        .route("/empty", get(|| async { StatusCode::OK.into_response() }))
        .route_layer(middleware::from_fn_with_state(wrapper, response_cache))
}

async fn hit(app: &Router, path: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn handler_runs_exactly_once_per_cache_window() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let app = cached_router(cache, calls.clone());

    let (status, first) = hit(&app, "/ok").await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = hit(&app, "/ok").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second, "hit must be byte-identical to the miss");
}

#[tokio::test]
async fn only_status_200_is_written_to_the_store() {
    let cache = Arc::new(MemoryCache::new());
    let app = cached_router(cache.clone(), Arc::new(AtomicUsize::new(0)));

    let (status, _) = hit(&app, "/created").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(cache.is_empty(), "201 must not be cached");

    let (status, _) = hit(&app, "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(cache.is_empty(), "404 must not be cached");

    let (status, _) = hit(&app, "/empty").await;
    assert_eq!(status, StatusCode::OK);
    assert!(cache.is_empty(), "empty payloads must not be cached");

    let (status, _) = hit(&app, "/ok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.len(), 1, "only the non-empty 200 lands in the store");
}

#[tokio::test]
async fn expired_entries_fall_back_to_the_handler() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let wrapper = ResponseCache::new(cache, Duration::from_millis(20)).with_key_prefix("views_");
    let counter = calls.clone();
    let app = Router::new()
        .route(
            "/ok",
            get(move || {
                let calls = counter.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"answer": 42}))
                }
            }),
        )
        .route_layer(middleware::from_fn_with_state(wrapper, response_cache));

    hit(&app, "/ok").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    hit(&app, "/ok").await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unless_predicate_bypasses_read_and_write() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let wrapper = ResponseCache::new(cache.clone(), Duration::from_secs(60))
        .with_unless(|| true);
    let counter = calls.clone();
    let app = Router::new()
        .route(
            "/ok",
            get(move || {
                let calls = counter.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"answer": 42}))
                }
            }),
        )
        .route_layer(middleware::from_fn_with_state(wrapper, response_cache));

    hit(&app, "/ok").await;
    hit(&app, "/ok").await;

    assert_eq!(calls.load(Ordering::SeqCst), 2, "bypassed requests always run");
    assert!(cache.is_empty(), "bypassed requests never write");
}

#[tokio::test]
async fn distinct_query_strings_get_distinct_entries() {
    let cache = Arc::new(MemoryCache::new());
    let app = cached_router(cache.clone(), Arc::new(AtomicUsize::new(0)));

    hit(&app, "/ok?page=1").await;
    hit(&app, "/ok?page=2").await;
    assert_eq!(cache.len(), 2);

    // Same params, different order: same entry.
    hit(&app, "/ok?a=1&b=2").await;
    hit(&app, "/ok?b=2&a=1").await;
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn failing_write_handler_never_triggers_invalidation() {
    let cache = Arc::new(MemoryCache::new());
    cache
        .set("views_subjects_abc", b"cached".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();

    let app = Router::new()
        .route(
            "/write",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": "boom"})),
                )
            }),
        )
        .route_layer(middleware::from_fn_with_state(
            PatternInvalidation::new(cache.clone(), "subjects"),
            invalidate_pattern,
        ));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/write")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(
        cache.get("views_subjects_abc").await.unwrap(),
        Some(b"cached".to_vec()),
        "failed mutations must leave the cache untouched"
    );
}

#[tokio::test]
async fn successful_write_handler_fires_pattern_invalidation() {
    let cache = Arc::new(MemoryCache::new());
    cache
        .set("views_subjects_abc", b"cached".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();

    let app = Router::new()
        .route(
            "/write",
            post(|| async { (StatusCode::CREATED, Json(serde_json::json!({"id": 1}))) }),
        )
        .route_layer(middleware::from_fn_with_state(
            PatternInvalidation::new(cache.clone(), "subjects"),
            invalidate_pattern,
        ));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/write")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    assert!(cache.is_empty(), "201 must fire the invalidation rule");
}
