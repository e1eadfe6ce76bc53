//! HTTP route handlers.
//!
//! Each sub-module corresponds to an API endpoint group. Everything under
//! `/api/v1` passes the auth gate ([`crate::auth::require_api_key`]) and then
//! the per-client limiter ([`crate::ratelimit::rate_limit`]); `/health` skips
//! both.

pub mod execute;
pub mod health;
pub mod live_data;
pub mod provision;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{self, ApiKey};
use crate::ratelimit;
use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/provision", post(provision::provision_router))
        .route("/verify", post(provision::verify_connectivity))
        .route("/live-data", post(live_data::live_data))
        .route("/execute", post(execute::execute))
        // Layers run bottom-up: auth first, then the limiter
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::rate_limit,
        ))
        .layer(middleware::from_fn(auth::require_api_key));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(Extension(ApiKey(state.config.auth.api_key.clone())))
        .layer(Extension(Arc::clone(&state.metrics)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics.record_request();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ssh::testing::ScriptedConnector;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(config: Config, connector: &ScriptedConnector) -> (Router, AppState) {
        let state = AppState::with_connector(config, Arc::new(connector.clone()));
        (router(state.clone()), state)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn provision_body() -> Value {
        json!({
            "router_id": "r-1",
            "tenant_id": "t-1",
            "configuration": {
                "ip_address": "10.0.0.1",
                "vpn_ip": "10.8.0.1",
                "username": "admin",
                "password": "x",
                "commands": ["/system/resource/print"],
            }
        })
    }

    #[tokio::test]
    async fn test_provision_prefers_vpn_and_returns_results() {
        let connector = ScriptedConnector::new();
        let (app, state) = app_with(Config::default(), &connector);

        let (status, body) = send(&app, post_json("/api/v1/provision", &provision_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Provisioning completed successfully");
        let results = body["data"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["command"], "/system/resource/print");
        assert_eq!(results[0]["output"], "ok: /system/resource/print\n");

        let log = connector.log();
        assert_eq!(log.targets.len(), 1);
        assert_eq!(log.targets[0].host, "10.8.0.1");
        assert_eq!(log.targets[0].port, 22);
        assert_eq!(log.targets[0].username, "admin");
        assert_eq!(log.closes, 1);
        drop(log);

        let metrics = state.metrics.snapshot();
        assert_eq!(metrics.provisions_succeeded, 1);
        assert_eq!(metrics.active_connections, 0);
    }

    #[tokio::test]
    async fn test_provision_without_commands_never_connects() {
        let connector = ScriptedConnector::new();
        let (app, _) = app_with(Config::default(), &connector);
        let mut body = provision_body();
        body["configuration"]
            .as_object_mut()
            .unwrap()
            .remove("commands");

        let (status, body) = send(&app, post_json("/api/v1/provision", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INVALID_REQUEST");
        assert!(connector.log().targets.is_empty());
    }

    #[tokio::test]
    async fn test_provision_rejects_wrong_shapes() {
        let connector = ScriptedConnector::new();
        let (app, _) = app_with(Config::default(), &connector);

        let mut body = provision_body();
        body["configuration"]["commands"] = json!(["/ok", 42]);
        let (status, resp) = send(&app, post_json("/api/v1/provision", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["code"], "INVALID_REQUEST");

        let (status, _) = send(
            &app,
            post_json("/api/v1/provision", &json!({"router_id": "r-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/provision")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, resp) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["success"], false);

        assert!(connector.log().targets.is_empty());
    }

    #[tokio::test]
    async fn test_provision_missing_address() {
        let connector = ScriptedConnector::new();
        let (app, _) = app_with(Config::default(), &connector);
        let body = json!({
            "router_id": "r-1",
            "tenant_id": "t-1",
            "configuration": { "commands": ["/x"] }
        });
        let (status, resp) = send(&app, post_json("/api/v1/provision", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp["error"]
            .as_str()
            .unwrap()
            .contains("Missing router IP address"));
    }

    #[tokio::test]
    async fn test_provision_connect_failure_is_503() {
        let connector = ScriptedConnector::refusing();
        let (app, state) = app_with(Config::default(), &connector);

        let (status, body) = send(&app, post_json("/api/v1/provision", &provision_body())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "CONNECTION_FAILED");
        assert!(body["error"].as_str().unwrap().contains("10.8.0.1:22"));
        assert_eq!(connector.log().closes, 1);
        assert_eq!(state.metrics.snapshot().provisions_failed, 1);
    }

    #[tokio::test]
    async fn test_provision_execution_failure_returns_partial_results() {
        let connector = ScriptedConnector::failing_on(&["B"]);
        let (app, _) = app_with(Config::default(), &connector);
        let mut body = provision_body();
        body["configuration"]["commands"] = json!(["A", "B", "C"]);

        let (status, body) = send(&app, post_json("/api/v1/provision", &body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "EXECUTION_FAILED");
        let partial = body["data"]["partial_results"].as_array().unwrap();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0]["command"], "A");
        assert_eq!(body["data"]["failed_command"]["command"], "B");
        assert!(body["error"].as_str().unwrap().contains("'B'"));
        assert_eq!(connector.log().executed, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_auth_gate() {
        let connector = ScriptedConnector::new();
        let mut config = Config::default();
        config.auth.api_key = "s3cret".into();
        let (app, state) = app_with(config, &connector);

        let (status, body) = send(&app, post_json("/api/v1/provision", &provision_body())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let mut request = post_json("/api/v1/provision", &provision_body());
        request
            .headers_mut()
            .insert("x-api-key", "s3cret".parse().unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let mut request = post_json("/api/v1/provision", &provision_body());
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        // Only the two authorized requests reached the router
        assert_eq!(connector.log().targets.len(), 2);
        assert_eq!(state.metrics.snapshot().auth_rejected, 1);
    }

    #[tokio::test]
    async fn test_health_skips_auth_and_reports_counters() {
        let connector = ScriptedConnector::new();
        let mut config = Config::default();
        config.auth.api_key = "s3cret".into();
        let (app, _) = app_with(config, &connector);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["metrics"]["total_requests"], 1);
        assert_eq!(body["metrics"]["active_connections"], 0);
    }

    #[tokio::test]
    async fn test_rate_limit_after_budget() {
        let connector = ScriptedConnector::new();
        let mut config = Config::default();
        config.rate_limit.max_requests = 2;
        let (app, state) = app_with(config, &connector);

        let verify = json!({"router_id": "r-1", "tenant_id": "t-1"});
        for _ in 0..2 {
            let (status, _) = send(&app, post_json("/api/v1/verify", &verify)).await;
            assert_eq!(status, StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/verify", &verify))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        assert_eq!(state.metrics.snapshot().rate_limited, 1);

        // Health is never limited
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejected_auth_does_not_consume_tokens() {
        let connector = ScriptedConnector::new();
        let mut config = Config::default();
        config.auth.api_key = "s3cret".into();
        config.rate_limit.max_requests = 1;
        let (app, state) = app_with(config, &connector);

        let verify = json!({"router_id": "r-1", "tenant_id": "t-1"});
        let (status, _) = send(&app, post_json("/api/v1/verify", &verify)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(state.limiter.is_empty().await);
    }

    #[tokio::test]
    async fn test_verify_stub_and_real_check() {
        let connector = ScriptedConnector::new();
        let (app, _) = app_with(Config::default(), &connector);

        let (status, body) = send(
            &app,
            post_json("/api/v1/verify", &json!({"router_id": "r-1", "tenant_id": "t-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Connectivity verified");
        assert!(connector.log().targets.is_empty());

        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/verify",
                &json!({
                    "router_id": "r-1",
                    "tenant_id": "t-1",
                    "configuration": { "ip_address": "10.0.0.1", "port": 2222 }
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["address"], "10.0.0.1:2222");
        let log = connector.log();
        assert_eq!(log.connects, 1);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_verify_connect_failure() {
        let connector = ScriptedConnector::refusing();
        let (app, _) = app_with(Config::default(), &connector);
        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/verify",
                &json!({
                    "router_id": "r-1",
                    "tenant_id": "t-1",
                    "configuration": { "ip_address": "10.0.0.1" }
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "CONNECTION_FAILED");
    }

    #[tokio::test]
    async fn test_placeholder_endpoints_are_not_implemented() {
        let connector = ScriptedConnector::new();
        let (app, _) = app_with(Config::default(), &connector);

        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/live-data",
                &json!({"router_id": "r-1", "tenant_id": "t-1", "context": "live"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["code"], "NOT_IMPLEMENTED");

        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/execute",
                &json!({"router_id": "r-1", "tenant_id": "t-1", "commands": ["/x"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["success"], false);

        // Malformed input is still a validation error
        let (status, _) = send(
            &app,
            post_json("/api/v1/execute", &json!({"router_id": "r-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(connector.log().targets.is_empty());
    }
}
