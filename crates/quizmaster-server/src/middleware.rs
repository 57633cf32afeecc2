use axum::extract::State;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use quizmaster_core::Actor;

// =============================================================================
// Identity Middleware
// =============================================================================

/// State for the identity middleware.
#[derive(Clone)]
pub struct IdentityState {
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
}

/// Resolves the request [`Actor`] and stores it in request extensions.
///
/// Identity is used only to scope cache keys and personal routes, so this
/// middleware fails open: a missing header, an unparseable token or a
/// verification error all resolve to the anonymous actor, never a 401.
pub async fn identity(
    State(state): State<IdentityState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let actor = resolve_actor(&state, req.headers());
    req.extensions_mut().insert(actor);
    next.run(req).await
}

fn resolve_actor(state: &IdentityState, headers: &HeaderMap) -> Actor {
    let Some(secret) = state.jwt_secret.as_deref() else {
        return Actor::anonymous();
    };

    let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
    else {
        return Actor::anonymous();
    };

    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    match jsonwebtoken::decode::<AccessClaims>(token, &key, &validation) {
        Ok(data) => Actor::authenticated(data.claims.sub),
        Err(e) => {
            tracing::debug!(error = %e, "Token verification failed, treating as anonymous");
            Actor::anonymous()
        }
    }
}

// =============================================================================
// Request Id Middleware
// =============================================================================

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;

    // Add/propagate the request id header to response
    res.headers_mut().insert(header_name, req_id_value);

    res
}
