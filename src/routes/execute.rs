//! Command execution by router id.
//!
//! Unlike `/provision`, this request names a router without carrying its
//! credentials. Without an inventory to look them up in, the endpoint
//! validates its input and answers `501 NOT_IMPLEMENTED`.

use axum::{extract::rejection::JsonRejection, Json};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::provision::require_ids;

/// Request body for `POST /api/v1/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub router_id: String,
    pub tenant_id: String,
    pub commands: Vec<String>,
}

/// `POST /api/v1/execute`
pub async fn execute(payload: Result<Json<ExecuteRequest>, JsonRejection>) -> ApiError {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection.into(),
    };
    if let Err(e) = require_ids(&req.router_id, &req.tenant_id) {
        return e;
    }
    if req.commands.is_empty() {
        return ApiError::validation("No commands provided");
    }
    info!(
        router_id = %req.router_id,
        tenant_id = %req.tenant_id,
        command_count = req.commands.len(),
        "Execute requested"
    );
    ApiError::NotImplemented("Command execution by router_id")
}
