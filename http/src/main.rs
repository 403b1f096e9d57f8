use std::net::SocketAddr;

use axum::Router;
use clap::Parser;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resgraph_mcp_runtime::{McpServer, RuntimeConfig};

mod middleware;
mod routes;
mod state;

use middleware::request_id::{MakeRequestUuidV7, REQUEST_ID_HEADER};

#[derive(Parser)]
#[command(
    name = "resgraph-http",
    version,
    about = "Azure Resource Graph MCP server over HTTP"
)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeConfig,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Externally visible base URL announced to SSE clients
    #[arg(long, env = "RESGRAPH_PUBLIC_URL")]
    public_url: Option<String>,

    /// Comma-separated allowed CORS origins (any origin when unset)
    #[arg(long, env = "RESGRAPH_CORS_ORIGINS")]
    cors_origins: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub server: String,
    pub version: String,
}

fn build_router(app_state: state::AppState, cors_layer: CorsLayer) -> Router {
    let request_id = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);
    Router::new()
        .merge(routes::system::router())
        .merge(routes::health::router())
        .merge(routes::mcp_http::router())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuidV7))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(cors_layer),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "resgraph_http=debug,resgraph_mcp_runtime=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let tools = match cli.runtime.build_tools() {
        Ok(tools) => tools,
        Err(message) => {
            tracing::error!(event = "invalid_configuration", %message);
            std::process::exit(1);
        }
    };
    let app_state = state::AppState::new(McpServer::new(tools), cli.public_url);
    let cors_layer = middleware::cors::build_cors_layer(cli.cors_origins.as_deref());
    let app = build_router(app_state, cors_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(event = "bind_failed", %addr, error = %err);
            std::process::exit(1);
        }
    };
    tracing::info!("Resource Graph MCP listening on {}", addr);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(event = "server_error", error = %err);
        std::process::exit(1);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn responses_carry_a_request_id_and_cors_headers() {
        let app = build_router(
            test_support::offline_state(),
            middleware::cors::build_cors_layer(Some("https://portal.example.com")),
        );
        let response = app
            .oneshot(
                Request::get("/health")
                    .header("origin", "https://portal.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://portal.example.com"
        );
    }

    #[tokio::test]
    async fn unset_cors_origins_allow_any_origin() {
        let app = build_router(
            test_support::offline_state(),
            middleware::cors::build_cors_layer(None),
        );
        let response = app
            .oneshot(
                Request::get("/")
                    .header("origin", "https://anywhere.example.org")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}
