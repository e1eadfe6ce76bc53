//! Provisioning endpoints.
//!
//! - `POST /api/v1/provision` — run a command batch on a router
//! - `POST /api/v1/verify` — connectivity check
//!
//! Connection details travel inline in `configuration`; the service keeps no
//! router inventory of its own.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::executor::CommandResult;
use crate::provision::{self, RouterConfiguration};
use crate::state::AppState;

/// Request body for `POST /api/v1/provision`.
#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub router_id: String,
    pub tenant_id: String,
    pub configuration: RouterConfiguration,
}

/// Response body for a successful provisioning run.
#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub success: bool,
    pub message: String,
    pub data: ProvisionData,
}

#[derive(Debug, Serialize)]
pub struct ProvisionData {
    /// One entry per command, in execution order.
    pub results: Vec<CommandResult>,
}

/// `POST /api/v1/provision` — connect to the router and run `commands` in order.
///
/// # Errors
///
/// - `400` `INVALID_REQUEST` — malformed body, missing address or commands
/// - `400` `BATCH_TOO_LARGE` — more than `server.max_batch_size` commands
/// - `503` `CONNECTION_FAILED` — dial, handshake or login failed
/// - `500` `EXECUTION_FAILED` — a command failed; `data.partial_results` holds
///   the commands that completed before it
pub async fn provision_router(
    State(state): State<AppState>,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let Json(req) = payload?;
    provision::require_ids(&req.router_id, &req.tenant_id)?;

    let span = info_span!(
        "provision",
        router_id = %req.router_id,
        tenant_id = %req.tenant_id,
        run = %Uuid::new_v4(),
    );
    async move {
        info!("Processing provision request");
        let plan = provision::plan(&req.configuration, &state.config)?;
        info!(
            address = %plan.target.address(),
            commands = plan.commands.len(),
            "Connecting to router"
        );

        let outcome = provision::run(state.connector.as_ref(), &state.metrics, plan).await;
        state.metrics.record_provision(outcome.is_ok());
        let results = outcome?;

        info!("Provisioning completed successfully");
        Ok::<_, ApiError>(Json(ProvisionResponse {
            success: true,
            message: "Provisioning completed successfully".to_string(),
            data: ProvisionData { results },
        }))
    }
    .instrument(span)
    .await
}

/// Request body for `POST /api/v1/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub router_id: String,
    pub tenant_id: String,
    /// When present, the connection is actually attempted.
    pub configuration: Option<RouterConfiguration>,
}

/// `POST /api/v1/verify` — check that a router is reachable.
///
/// Without `configuration` there is nothing to dial and the request is only
/// validated. With it, a session is opened and closed again; failures map like
/// `/provision`.
pub async fn verify_connectivity(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    provision::require_ids(&req.router_id, &req.tenant_id)?;
    info!(
        router_id = %req.router_id,
        tenant_id = %req.tenant_id,
        "Verifying connectivity"
    );

    let Some(configuration) = req.configuration else {
        return Ok(Json(json!({
            "success": true,
            "message": "Connectivity verified",
        })));
    };

    let target = provision::session_target(&configuration, &state.config)?;
    let address = target.address();
    provision::check_connectivity(state.connector.as_ref(), &state.metrics, target).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Connectivity verified",
        "data": { "address": address },
    })))
}
