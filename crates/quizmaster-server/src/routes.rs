//! Router assembly: handlers wrapped with cache and invalidation middleware.

use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::{
    KeyInvalidation, PatternInvalidation, ResponseCache, invalidate_key, invalidate_pattern,
    response_cache,
};
use crate::handlers;
use crate::middleware::{self as app_middleware, IdentityState};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cfg = state.config.clone();
    let default_ttl = Duration::from_secs(cfg.cache.default_ttl_secs);

    // Cached read routes. The key prefix carries the route group name so
    // pattern invalidation can match the otherwise-opaque hashed keys.
    let subjects_cache = ResponseCache::new(state.cache.clone(), default_ttl)
        .with_key_prefix(format!("{}subjects_", cfg.cache.key_prefix));
    let quizzes_cache = ResponseCache::new(state.cache.clone(), default_ttl)
        .with_key_prefix(format!("{}quizzes_", cfg.cache.key_prefix));

    let subjects_read = Router::new()
        .route("/api/subjects", get(handlers::list_subjects))
        .route_layer(middleware::from_fn_with_state(
            subjects_cache,
            response_cache,
        ));

    let quizzes_read = Router::new()
        .route("/api/quizzes", get(handlers::list_quizzes))
        .route_layer(middleware::from_fn_with_state(quizzes_cache, response_cache));

    // Subject writes invalidate every subjects-prefixed entry. Quiz lists
    // embed chapter data from the same tables, so they share the pattern's
    // fate only on backends without scan support (full clear).
    let subjects_write = Router::new()
        .route("/api/subjects", post(handlers::create_subject))
        .route(
            "/api/subjects/{id}",
            axum::routing::put(handlers::update_subject).delete(handlers::delete_subject),
        )
        .route_layer(middleware::from_fn_with_state(
            PatternInvalidation::new(state.cache.clone(), "subjects"),
            invalidate_pattern,
        ));

    // Score writes invalidate the one summary they affect.
    let scores_write = Router::new()
        .route("/api/users/{uid}/scores", post(handlers::record_score))
        .route_layer(middleware::from_fn_with_state(
            KeyInvalidation::new(state.cache.clone(), "user_summary:{uid}"),
            invalidate_key,
        ));

    let identity = IdentityState {
        jwt_secret: cfg.auth.jwt_secret.clone(),
    };

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Cached reads and invalidating writes
        .merge(subjects_read)
        .merge(quizzes_read)
        .merge(subjects_write)
        .merge(scores_write)
        .route("/api/users/{uid}/summary", get(handlers::user_summary))
        // Reminder preferences for the authenticated actor
        .route(
            "/api/reminders",
            get(handlers::get_reminder_preference)
                .post(handlers::set_reminder_preference)
                .delete(handlers::disable_reminders),
        )
        // Administrative job surface
        .route("/api/admin/jobs", post(handlers::trigger_job))
        .route("/api/admin/jobs/stats", get(handlers::job_stats))
        .route("/api/admin/jobs/{id}", get(handlers::job_status))
        // Middleware stack (order: request id -> identity -> cors/trace -> body limit)
        .layer(middleware::from_fn_with_state(
            identity,
            app_middleware::identity,
        ))
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(
            cfg.server.body_limit_bytes,
        ))
        .with_state(state)
}
