use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use super::mcp_http::{MCP_HTTP_PATH, MCP_PATH};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(server_info))
}

async fn server_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": resgraph_mcp_runtime::MCP_SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_version": resgraph_mcp_runtime::MCP_PROTOCOL_VERSION,
        "endpoints": {
            "mcp": MCP_PATH,
            "mcp_http": MCP_HTTP_PATH,
            "sse": MCP_PATH,
            "health": "/health"
        },
        "tools": state.server.tool_names(),
    }))
}
