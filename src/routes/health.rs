//! Unauthenticated health-check endpoint.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// `GET /health` — liveness probe.
///
/// Returns status, uptime, version, and the service counters. No
/// authentication or rate limiting, suitable for load-balancer health checks.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.start_time.elapsed().as_secs();
    #[allow(clippy::cast_possible_truncation)]
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64);

    Json(json!({
        "status": "healthy",
        "timestamp": timestamp_ms,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "metrics": state.metrics.snapshot(),
        "rate_limited_clients": state.limiter.len().await,
    }))
}
