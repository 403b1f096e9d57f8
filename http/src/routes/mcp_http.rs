use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};

use crate::state::AppState;

pub const MCP_PATH: &str = "/mcp";
pub const MCP_HTTP_PATH: &str = "/mcp-http";
const SSE_PING_INTERVAL: Duration = Duration::from_secs(30);

pub fn router() -> Router<AppState> {
    Router::new()
        .route(MCP_PATH, post(mcp_post).get(mcp_sse))
        .route(MCP_HTTP_PATH, post(mcp_post))
}

async fn mcp_post(State(state): State<AppState>, body: Bytes) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::info!(event = "mcp_http_parse_error", error = %err);
            return (
                StatusCode::BAD_REQUEST,
                Json(resgraph_mcp_runtime::parse_error_response(err.to_string())),
            )
                .into_response();
        }
    };

    let batch_size = incoming.as_array().map(Vec::len);
    let mut responses = resgraph_mcp_runtime::handle_http_jsonrpc(&state.server, incoming).await;
    tracing::info!(
        event = "mcp_http_request",
        batch_size = ?batch_size,
        responses = responses.len(),
    );

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 && batch_size.is_none() {
        return (StatusCode::OK, Json(responses.remove(0))).into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}

async fn mcp_sse(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let base = state
        .public_url
        .clone()
        .unwrap_or_else(|| request_base_url(&headers));
    let endpoint = format!("{base}{MCP_PATH}");
    tracing::info!(event = "mcp_sse_opened", endpoint = %endpoint);
    Sse::new(sse_events(endpoint, SSE_PING_INTERVAL))
}

/// One `endpoint` event, then a `ping` every `period`.
fn sse_events(
    endpoint: String,
    period: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let announce = tokio_stream::once(Ok::<Event, Infallible>(
        Event::default()
            .event("endpoint")
            .data(endpoint_payload(&endpoint).to_string()),
    ));
    let interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let pings = IntervalStream::new(interval).map(|_| {
        Ok::<Event, Infallible>(
            Event::default()
                .event("ping")
                .data(ping_payload(chrono::Utc::now()).to_string()),
        )
    });
    announce.chain(pings)
}

fn endpoint_payload(endpoint: &str) -> Value {
    json!({ "endpoint": endpoint })
}

fn ping_payload(now: chrono::DateTime<chrono::Utc>) -> Value {
    json!({ "type": "ping", "timestamp": now.to_rfc3339() })
}

/// `X-Forwarded-Proto`/`X-Forwarded-Host` first, then `Host`.
pub fn request_base_url(headers: &HeaderMap) -> String {
    let forwarded_proto = first_header_token(headers, "x-forwarded-proto");
    let forwarded_host = first_header_token(headers, "x-forwarded-host");
    let host = forwarded_host.or_else(|| {
        headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
    });

    let host = host.unwrap_or_else(|| "localhost".to_string());
    let proto = forwarded_proto.unwrap_or_else(|| {
        if host.contains("localhost") || host.starts_with("127.0.0.1") {
            "http".to_string()
        } else {
            "https".to_string()
        }
    });
    format!("{}://{}", proto.trim_end_matches(':'), host)
}

fn first_header_token(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}
