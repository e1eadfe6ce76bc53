//! Pre-shared API key authentication.
//!
//! Every `/api/v1/*` endpoint requires the key, supplied either as an
//! `X-API-Key: <key>` header (checked first) or as `Authorization: Bearer <key>`.
//! When no key is configured the gate lets every request through; `main` logs
//! that once at startup.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::ApiError;
use crate::state::Metrics;

/// Primary header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const BEARER_PREFIX: &str = "Bearer ";

/// Extension type carrying the expected API key, injected into the router
/// layer so [`require_api_key`] can access it without touching `AppState`.
///
/// An empty key disables authentication.
#[derive(Clone, Debug)]
pub struct ApiKey(pub String);

impl ApiKey {
    pub fn is_disabled(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pull the presented credential out of the request headers.
///
/// `X-API-Key` wins over `Authorization`; the bearer form only counts when the
/// header starts with the exact `Bearer ` prefix. An empty `X-API-Key` counts
/// as absent.
pub fn extract_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
    {
        return Some(key);
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
}

/// Admission decision of the auth gate. Pure function of the headers and the
/// configured key.
pub fn authorize(headers: &HeaderMap, expected: &ApiKey) -> bool {
    if expected.is_disabled() {
        return true;
    }
    extract_key(headers)
        .is_some_and(|provided| constant_time_eq(expected.0.as_bytes(), provided.as_bytes()))
}

/// Axum middleware that rejects requests without a valid API key with
/// `401 Unauthorized`. The expected key is injected via the [`ApiKey`]
/// extension; a missing extension is treated as a misconfiguration and
/// rejected the same way.
pub async fn require_api_key(request: Request, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<ApiKey>()
        .is_some_and(|key| authorize(request.headers(), key));

    if !allowed {
        debug!("Rejected {} {}: bad API key", request.method(), request.uri().path());
        if let Some(metrics) = request.extensions().get::<std::sync::Arc<Metrics>>() {
            metrics.record_auth_rejected();
        }
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
///
/// Always iterates over the full length of `expected` regardless of `provided`
/// length, so an attacker cannot determine the key length from response times.
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0xff);
        diff |= e ^ p;
    }
    diff == 0
}
