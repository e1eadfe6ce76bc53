//! Live router data endpoint.
//!
//! Fetching live data needs a router inventory this service doesn't have, so
//! the endpoint validates its input and answers `501 NOT_IMPLEMENTED`.

use axum::{extract::rejection::JsonRejection, Json};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::provision::require_ids;

/// Request body for `POST /api/v1/live-data`.
#[derive(Debug, Deserialize)]
pub struct LiveDataRequest {
    pub router_id: String,
    pub tenant_id: String,
    /// `"live"`, `"provisioning"` or `"details"`.
    #[serde(default)]
    pub context: Option<String>,
}

/// `POST /api/v1/live-data`
pub async fn live_data(payload: Result<Json<LiveDataRequest>, JsonRejection>) -> ApiError {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection.into(),
    };
    if let Err(e) = require_ids(&req.router_id, &req.tenant_id) {
        return e;
    }
    info!(
        router_id = %req.router_id,
        tenant_id = %req.tenant_id,
        context = req.context.as_deref().unwrap_or("live"),
        "Live data requested"
    );
    ApiError::NotImplemented("Live data fetch")
}
