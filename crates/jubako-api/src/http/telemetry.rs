//! Per-request accounting for routed requests.

use std::sync::Arc;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::state::ApiState;

/// Count each response by matched route and status.
pub(crate) async fn record_http_metrics(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_string(),
        |matched| matched.as_str().to_string(),
    );
    let response = next.run(request).await;
    let status = response.status();
    state.telemetry.inc_http_request(&route, status.as_u16());
    if status.is_server_error() {
        warn!(route = %route, status = status.as_u16(), "request failed");
    }
    response
}
