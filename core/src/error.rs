use thiserror::Error;

/// Failure raised anywhere inside a tool invocation: credential acquisition,
/// the upstream HTTP call, or decoding its response.
///
/// Tool handlers never let this escape. It is rendered into the tool's text
/// result together with remediation tips.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Every credential strategy failed. The message already carries the
    /// remediation hint.
    #[error("{0}")]
    Auth(String),
    /// Upstream answered with a non-2xx status.
    #[error("Azure API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Request timed out. Try reducing the scope or adding filters to your query.")]
    Timeout,
    /// DNS, connection, TLS or body decoding failure.
    #[error("Request failed: {0}")]
    Transport(String),
}

impl GraphError {
    /// Machine-readable code, used as a structured logging field.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::Auth(_) => codes::AUTH_FAILED,
            GraphError::Api { .. } => codes::API_ERROR,
            GraphError::Timeout => codes::TIMEOUT,
            GraphError::Transport(_) => codes::TRANSPORT_ERROR,
        }
    }
}

/// Malformed tool arguments or an unknown tool name. Raised before any
/// credential or network work happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: codes::VALIDATION_FAILED,
            message: message.into(),
            field: None,
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self {
            code: codes::UNKNOWN_TOOL,
            message: format!("Unknown tool: {name}"),
            field: Some("name".to_string()),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Error codes shared by logs and JSON-RPC error data.
pub mod codes {
    pub const AUTH_FAILED: &str = "auth_failed";
    pub const API_ERROR: &str = "api_error";
    pub const TIMEOUT: &str = "timeout";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status_and_upstream_message() {
        let err = GraphError::Api {
            status: 403,
            message: "The client does not have authorization".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Azure API error (403): The client does not have authorization"
        );
        assert_eq!(err.code(), codes::API_ERROR);
    }

    #[test]
    fn unknown_tool_is_a_validation_error_on_the_name_field() {
        let err = ValidationError::unknown_tool("azure_delete_everything");
        assert_eq!(err.code, codes::UNKNOWN_TOOL);
        assert_eq!(err.field.as_deref(), Some("name"));
        assert_eq!(err.to_string(), "Unknown tool: azure_delete_everything");
    }
}
