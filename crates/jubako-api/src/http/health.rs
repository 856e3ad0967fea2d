//! Health and metrics endpoints.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use jubako_telemetry::build_sha;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::http::constants::METRICS_CONTENT_TYPE;
use crate::http::errors::ApiError;
use crate::state::ApiState;

/// Liveness payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: String,
    /// Downloads past metadata resolution and not yet terminal.
    pub active_downloads: usize,
    /// Files registered as fully downloaded.
    pub ready_files: usize,
    /// Build identifier recorded at startup.
    pub build: String,
}

pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_downloads: state.registry.active_downloads().await,
        ready_files: state.registry.len().await,
        build: build_sha().to_string(),
    })
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, METRICS_CONTENT_TYPE)
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}
