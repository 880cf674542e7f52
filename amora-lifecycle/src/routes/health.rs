use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use amora_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::store::LifecycleStore;
use crate::AppState;

fn check(name: &str, result: Result<(), String>) -> HealthCheck {
    match result {
        Ok(()) => HealthCheck { name: name.to_string(), status: HealthStatus::Healthy, message: None },
        Err(message) => HealthCheck {
            name: name.to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(message),
        },
    }
}

/// Health check that probes postgres and redis.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let checks = vec![
        check("postgres", state.lifecycle.store().ping().map_err(|e| e.to_string())),
        check("redis", state.redis.ping().await.map_err(|e| e.to_string())),
    ];

    let response = HealthResponse::healthy("amora-lifecycle", env!("CARGO_PKG_VERSION"))
        .with_checks(checks);

    let status = match response.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
