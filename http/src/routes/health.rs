use axum::{Json, Router, routing::get};

use crate::HealthResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness only; upstream reachability is checked by `resgraph-mcp diagnose`.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        server: resgraph_mcp_runtime::MCP_SERVER_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
