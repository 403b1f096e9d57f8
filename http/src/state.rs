use std::sync::Arc;

use resgraph_mcp_runtime::McpServer;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
    /// Externally visible base URL; derived from request headers when unset.
    pub public_url: Option<String>,
}

impl AppState {
    pub fn new(server: McpServer, public_url: Option<String>) -> Self {
        Self {
            server: Arc::new(server),
            public_url: public_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        }
    }
}
