use std::time::Instant;

use clap::{Args, Subcommand};
use resgraph_core::error::ValidationError;
use resgraph_core::format::to_pretty_json;
use serde_json::{Map, Value, json};
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::Instrument;
use uuid::Uuid;

pub mod auth;
pub mod client;
pub mod registry;
pub mod tools;

use auth::{
    CliCommand, ClientSecret, CredentialChain, CredentialConfig, DEFAULT_AUTHORITY_HOST,
    DEFAULT_AZ_CLI, DEFAULT_MANAGED_IDENTITY_ENDPOINT,
};
use client::{DEFAULT_API_BASE_URL, ResourceGraphClient};
use registry::ToolRegistry;
use tools::GraphTools;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "resgraph-mcp";

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the Resource Graph MCP server over stdio
    Serve,
    /// Check credentials and upstream reachability, print a JSON report
    Diagnose,
}

/// Upstream endpoints and credentials shared by every transport.
#[derive(Args, Clone)]
pub struct RuntimeConfig {
    /// Azure management API base URL
    #[arg(long, env = "RESGRAPH_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,
    /// Entra ID authority used for the client-credentials grant
    #[arg(long, env = "RESGRAPH_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    pub authority_host: String,
    /// Instance metadata token endpoint for managed identity
    #[arg(
        long,
        env = "RESGRAPH_MANAGED_IDENTITY_ENDPOINT",
        default_value = DEFAULT_MANAGED_IDENTITY_ENDPOINT
    )]
    pub managed_identity_endpoint: String,
    /// Azure CLI executable used as the last credential fallback
    #[arg(long, env = "RESGRAPH_AZ_CLI", default_value = DEFAULT_AZ_CLI)]
    pub az_cli: String,
    /// Service principal or user-assigned identity client id
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,
    /// Service principal secret
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
    /// Directory (tenant) id of the service principal
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,
}

impl RuntimeConfig {
    pub fn credential_config(&self) -> CredentialConfig {
        CredentialConfig {
            managed_identity_endpoint: self.managed_identity_endpoint.clone(),
            managed_identity_client_id: self
                .client_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
            authority_host: self.authority_host.clone(),
            client_secret: ClientSecret::from_parts(
                self.client_id.as_deref(),
                self.client_secret.as_deref(),
                self.tenant_id.as_deref(),
            ),
            cli: CliCommand::azure(&self.az_cli),
            ..CredentialConfig::default()
        }
    }

    pub fn build_tools(&self) -> Result<GraphTools, String> {
        let client = ResourceGraphClient::new(&self.api_base_url)
            .map_err(|e| format!("Invalid API base URL '{}': {e}", self.api_base_url))?;
        Ok(GraphTools::new(
            CredentialChain::new(self.credential_config()),
            client,
        ))
    }
}

pub async fn run(config: RuntimeConfig, command: McpCommands) -> i32 {
    let server = match config.build_tools() {
        Ok(tools) => McpServer::new(tools),
        Err(message) => {
            let payload = json!({ "error": "invalid_configuration", "message": message });
            eprintln!("{}", to_pretty_json(&payload));
            return 1;
        }
    };
    match command {
        McpCommands::Serve => match server.serve_stdio().await {
            Ok(()) => 0,
            Err(err) => {
                let payload = json!({
                    "error": "mcp_server_error",
                    "message": err,
                });
                eprintln!("{}", to_pretty_json(&payload));
                1
            }
        },
        McpCommands::Diagnose => {
            let report = server.run_diagnostics().await;
            println!("{}", to_pretty_json(&report));
            if report.get("status").and_then(Value::as_str) == Some("ready") {
                0
            } else {
                2
            }
        }
    }
}

/// Entry point for HTTP adapters: one JSON-RPC message or batch in, the
/// responses out. An empty vector means only notifications were received.
pub async fn handle_http_jsonrpc(server: &McpServer, incoming: Value) -> Vec<Value> {
    server.handle_incoming_message(incoming).await
}

/// JSON-RPC error for a body that is not JSON at all.
pub fn parse_error_response(message: impl Into<String>) -> Value {
    error_response(Value::Null, RpcError::parse_error(message))
}

pub struct McpServer {
    registry: ToolRegistry,
    tools: GraphTools,
}

impl McpServer {
    pub fn new(tools: GraphTools) -> Self {
        Self {
            registry: ToolRegistry::new(),
            tools,
        }
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        tracing::info!(
            event = "mcp_server_started",
            transport = "stdio",
            version = env!("CARGO_PKG_VERSION"),
        );
        let mut reader = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        self.serve(&mut reader, &mut stdout).await
    }

    /// Answers every message in the framing it arrived in, until EOF.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let message = read_framed_json(reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(message) = message else {
                break;
            };

            let responses = match message.payload {
                Ok(incoming) => self.handle_incoming_message(incoming).await,
                Err(err) => vec![error_response(Value::Null, RpcError::parse_error(err))],
            };
            for response in responses {
                write_framed_json(writer, &response, message.framing)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
        Ok(())
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => Some(match self.handle_request(method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            }),
            None => {
                tracing::debug!(event = "mcp_notification", method);
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Read-only access to Azure Resource Graph. Use azure_resource_graph_search_resources for simple filters, azure_resource_graph_query for KQL, azure_resource_graph_history for change tracking. Pass response_format=\"json\" when complete data is needed."
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self.registry.definitions().map(|tool| tool.to_value()).collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let arguments = match params.get("arguments") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let invocation_id = Uuid::now_v7();
        let span = tracing::info_span!("tool_call", tool = %name, invocation_id = %invocation_id);
        let started = Instant::now();
        let outcome = self
            .registry
            .call(&self.tools, name, arguments)
            .instrument(span.clone())
            .await;
        span.in_scope(|| match &outcome {
            Ok(text) => tracing::info!(
                event = "tool_call_completed",
                duration_ms = started.elapsed().as_millis() as u64,
                chars = text.chars().count(),
            ),
            Err(err) => tracing::info!(
                event = "tool_call_rejected",
                error_code = err.code,
                field = err.field.as_deref().unwrap_or(""),
            ),
        });

        let text = outcome.map_err(RpcError::from)?;
        Ok(json!({
            "content": [{ "type": "text", "text": text }]
        }))
    }

    /// Acquires a credential and lists operations as a reachability probe.
    /// The token itself never appears in the report.
    pub async fn run_diagnostics(&self) -> Value {
        let mut checks = Map::new();
        let ready = match self.tools.credentials().acquire().await {
            Ok(credential) => {
                checks.insert(
                    "credential".to_string(),
                    json!({
                        "ok": true,
                        "source": credential.source().as_str(),
                        "token_length": credential.token_len(),
                    }),
                );
                match self.tools.list_operations_with(&credential).await {
                    Ok(body) => {
                        let count = body
                            .get("value")
                            .and_then(Value::as_array)
                            .map(Vec::len)
                            .unwrap_or(0);
                        checks.insert(
                            "operations".to_string(),
                            json!({ "ok": true, "operation_count": count }),
                        );
                        true
                    }
                    Err(err) => {
                        checks.insert(
                            "operations".to_string(),
                            json!({ "ok": false, "error": err.code(), "message": err.to_string() }),
                        );
                        false
                    }
                }
            }
            Err(err) => {
                checks.insert(
                    "credential".to_string(),
                    json!({ "ok": false, "error": err.code(), "message": err.to_string() }),
                );
                checks.insert(
                    "operations".to_string(),
                    json!({ "ok": false, "skipped": true }),
                );
                false
            }
        };

        json!({
            "status": if ready { "ready" } else { "not_ready" },
            "server": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "tools": self.tool_names(),
            "checks": Value::Object(checks),
        })
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: format!("Parse error: {}", message.into()),
            data: None,
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }
}

impl From<ValidationError> for RpcError {
    fn from(err: ValidationError) -> Self {
        let mut data = json!({ "error": err.code });
        if let Some(field) = &err.field {
            data["field"] = Value::String(field.clone());
        }
        Self {
            code: -32602,
            message: err.message,
            data: Some(data),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

/// How a stdio message was delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line.
    Line,
    /// LSP-style `Content-Length` headers followed by the body.
    ContentLength,
}

/// Upper bound for a `Content-Length` framed body.
pub const MAX_CONTENT_LENGTH: usize = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct FramedMessage {
    pub framing: Framing,
    pub payload: Result<Value, String>,
}

/// Reads the next message. `Ok(None)` on a clean EOF.
pub async fn read_framed_json<R>(reader: &mut R) -> Result<Option<FramedMessage>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    loop {
        let mut raw = Vec::new();
        let bytes_read = reader.read_until(b'\n', &mut raw).await?;
        if bytes_read == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(err) if !in_headers => {
                return Ok(Some(FramedMessage {
                    framing: Framing::Line,
                    payload: Err(format!("Message is not valid UTF-8: {err}")),
                }));
            }
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP header is not valid UTF-8",
                ));
            }
        };
        let line = line.trim_end_matches(['\r', '\n']);
        if !in_headers {
            let start = line.trim_start();
            if start.is_empty() {
                continue;
            }
            if start.starts_with('{') || start.starts_with('[') || !start.contains(':') {
                return Ok(Some(FramedMessage {
                    framing: Framing::Line,
                    payload: serde_json::from_str(start).map_err(|e| e.to_string()),
                }));
            }
            in_headers = true;
        }

        if line.is_empty() {
            break;
        }
        if line.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = line
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    if content_length > MAX_CONTENT_LENGTH {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Content-Length {content_length} exceeds {MAX_CONTENT_LENGTH} bytes"),
        ));
    }
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(FramedMessage {
        framing: Framing::ContentLength,
        payload: serde_json::from_slice(&payload).map_err(|e| e.to_string()),
    }))
}

pub async fn write_framed_json<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{OPERATIONS_TOOL, QUERY_TOOL};
    use crate::tools::tests::{Captured, stub_tools, stub_upstream};
    use clap::Parser;

    async fn offline_server() -> McpServer {
        McpServer::new(stub_tools("http://127.0.0.1:9", "exit 1").await)
    }

    fn request(id: i64, method: &str, params: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_tools_capability() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(request(1, "initialize", json!({})))
            .await;
        assert_eq!(responses.len(), 1);
        let result = &responses[0]["result"];
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], MCP_SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_returns_four_tools() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(request(2, "tools/list", Value::Null))
            .await;
        let tools = responses[0]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
        assert_eq!(tools[0]["name"], QUERY_TOOL);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(
                json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            )
            .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_invalid_request() {
        let server = offline_server().await;
        let responses = server.handle_incoming_message(json!([])).await;
        assert_eq!(responses[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn batch_skips_notifications() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(json!([
                request(1, "ping", Value::Null),
                { "jsonrpc": "2.0", "method": "notifications/cancelled" },
                request(2, "ping", Value::Null)
            ]))
            .await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn wrong_version_and_unknown_method() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(json!({ "jsonrpc": "1.0", "id": 7, "method": "ping" }))
            .await;
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert_eq!(responses[0]["id"], 7);

        let responses = server
            .handle_incoming_message(request(8, "resources/list", Value::Null))
            .await;
        assert_eq!(responses[0]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(request(
                3,
                "tools/call",
                json!({ "name": "azure_resource_graph_nope", "arguments": {} }),
            ))
            .await;
        let error = &responses[0]["error"];
        assert_eq!(error["code"], -32602);
        assert_eq!(error["data"]["error"], "unknown_tool");
        assert_eq!(error["data"]["field"], "name");
    }

    #[tokio::test]
    async fn malformed_arguments_name_the_field() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(request(
                4,
                "tools/call",
                json!({ "name": QUERY_TOOL, "arguments": { "query": "  " } }),
            ))
            .await;
        assert_eq!(responses[0]["error"]["code"], -32602);
        assert_eq!(responses[0]["error"]["data"]["field"], "query");
    }

    #[tokio::test]
    async fn tool_failure_is_a_successful_text_result() {
        let server = offline_server().await;
        let responses = server
            .handle_incoming_message(request(
                5,
                "tools/call",
                json!({ "name": OPERATIONS_TOOL }),
            ))
            .await;
        let content = &responses[0]["result"]["content"][0];
        assert_eq!(content["type"], "text");
        assert!(content["text"].as_str().unwrap().starts_with("❌ **Error:**"));
    }

    #[tokio::test]
    async fn serve_answers_in_the_framing_of_the_request() {
        let server = offline_server().await;
        let ping = serde_json::to_string(&request(1, "ping", Value::Null)).unwrap();
        let input = format!(
            "{ping}\nContent-Length: {}\r\n\r\n{ping}not json\n",
            ping.len()
        );
        let mut reader = BufReader::new(input.as_bytes());
        let mut output = Vec::new();

        server.serve(&mut reader, &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        let expected_body = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        assert!(output.starts_with(&format!("{expected_body}\n")));
        assert!(output.contains(&format!(
            "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n{expected_body}",
            expected_body.len()
        )));
        assert!(output.trim_end().ends_with("}}"));
        assert!(output.contains(r#""id":null,"error":{"code":-32700"#));
    }

    #[tokio::test]
    async fn read_framed_json_reports_clean_eof() {
        let mut reader = BufReader::new("\n\n".as_bytes());
        assert!(read_framed_json(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn serve_keeps_going_after_a_non_utf8_line() {
        let server = offline_server().await;
        let ping = serde_json::to_string(&request(7, "ping", Value::Null)).unwrap();
        let mut input = b"{\"x\":\"\xff\"}\n".to_vec();
        input.extend_from_slice(ping.as_bytes());
        input.push(b'\n');
        let mut reader = BufReader::new(input.as_slice());
        let mut output = Vec::new();

        server.serve(&mut reader, &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["error"]["code"], -32700);
        assert_eq!(first["id"], Value::Null);
        assert_eq!(lines[1], r#"{"jsonrpc":"2.0","id":7,"result":{}}"#);
    }

    #[tokio::test]
    async fn oversized_content_length_is_rejected() {
        let input = format!("Content-Length: {}\r\n\r\n{{}}", MAX_CONTENT_LENGTH + 1);
        let mut reader = BufReader::new(input.as_bytes());
        let err = read_framed_json(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn diagnostics_report_ready_when_upstream_answers() {
        let upstream = stub_upstream(Captured::default()).await;
        let server = McpServer::new(stub_tools(&upstream, "echo diag-token").await);
        let report = server.run_diagnostics().await;
        assert_eq!(report["status"], "ready");
        assert_eq!(report["checks"]["credential"]["source"], "azure_cli");
        assert_eq!(report["checks"]["credential"]["token_length"], 10);
        assert_eq!(report["checks"]["operations"]["operation_count"], 1);
        assert!(!report.to_string().contains("diag-token"));
    }

    #[tokio::test]
    async fn diagnostics_report_not_ready_without_credentials() {
        let report = offline_server().await.run_diagnostics().await;
        assert_eq!(report["status"], "not_ready");
        assert_eq!(report["checks"]["credential"]["error"], "auth_failed");
        assert_eq!(report["checks"]["operations"]["skipped"], true);
    }

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        runtime: RuntimeConfig,
    }

    #[test]
    fn explicit_flags_build_a_client_secret() {
        let cli = TestCli::parse_from([
            "resgraph",
            "--client-id",
            "app",
            "--client-secret",
            "s3cret",
            "--tenant-id",
            "tenant",
            "--az-cli",
            "/opt/az/bin/az",
        ]);
        let config = cli.runtime.credential_config();
        let secret = config.client_secret.unwrap();
        assert_eq!(secret.tenant_id, "tenant");
        assert_eq!(config.managed_identity_client_id.as_deref(), Some("app"));
        assert_eq!(config.cli.program, "/opt/az/bin/az");
        assert_eq!(config.cli.args[0], "account");
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let mut cli = TestCli::parse_from(["resgraph"]);
        cli.runtime.api_base_url = "not a url".to_string();
        assert!(cli.runtime.build_tools().is_err());
    }
}
