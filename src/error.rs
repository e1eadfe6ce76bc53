//! API error taxonomy.
//!
//! [`ApiError`] is the only place where internal failures turn into HTTP
//! responses. Every variant renders as
//! `{"success": false, "error": "...", "code": "...", "data"?: {...}}`.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::executor::BatchError;
use crate::ssh::SshError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing request fields. Client fault, never retried.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Too many commands (max {max})")]
    BatchTooLarge { max: usize },

    /// Auth gate rejection.
    #[error("Unauthorized - missing or invalid API key")]
    Unauthorized,

    /// Limiter rejection. Retryable once the window has elapsed.
    #[error("Rate limit exceeded - too many requests")]
    RateLimited { retry_after_secs: u64 },

    /// Dial, handshake, host-key or authentication failure.
    #[error("Connection failed: {0}")]
    Connection(#[source] SshError),

    /// A command failed mid-batch. Carries the partial results.
    #[error("Execution failed: {0}")]
    Execution(#[source] BatchError),

    /// Capability the service does not provide yet.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BatchTooLarge { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_REQUEST",
            Self::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Connection(_) => "CONNECTION_FAILED",
            Self::Execution(_) => "EXECUTION_FAILED",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }

    fn data(&self) -> Option<Value> {
        match self {
            Self::Execution(e) => Some(json!({
                "partial_results": e.completed,
                "failed_command": e.failed,
            })),
            _ => None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        });
        if let Some(data) = self.data() {
            body["data"] = data;
        }
        let mut response = (self.status(), Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
