use std::future::Future;
use std::pin::Pin;

use resgraph_core::error::ValidationError;
use resgraph_core::requests::{
    HistoryRequest, OperationsRequest, QueryRequest, SearchFilter, parse_arguments,
};
use serde_json::{Value, json};

use crate::tools::GraphTools;

pub const QUERY_TOOL: &str = "azure_resource_graph_query";
pub const SEARCH_TOOL: &str = "azure_resource_graph_search_resources";
pub const HISTORY_TOOL: &str = "azure_resource_graph_history";
pub const OPERATIONS_TOOL: &str = "azure_resource_graph_operations";

pub type ToolFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, ValidationError>> + Send + 'a>>;
pub type ToolHandler = for<'a> fn(&'a GraphTools, Value) -> ToolFuture<'a>;

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Entry of a `tools/list` result.
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
            "annotations": {
                "title": self.title,
                "readOnlyHint": true,
                "destructiveHint": false,
                "idempotentHint": true,
                "openWorldHint": true
            }
        })
    }
}

struct ToolEntry {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Fixed table of tools, built once at startup. Lookup is by exact name.
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let entries = vec![
            ToolEntry {
                definition: ToolDefinition {
                    name: QUERY_TOOL,
                    title: "Azure Resource Graph Query",
                    description: "Execute a KQL query against Azure Resource Graph to explore and analyze Azure resources across subscriptions and management groups. Example: 'Resources | where type =~ \"Microsoft.Compute/virtualMachines\" | project name, location'.",
                    input_schema: query_schema(),
                },
                handler: call_query,
            },
            ToolEntry {
                definition: ToolDefinition {
                    name: SEARCH_TOOL,
                    title: "Azure Resource Search",
                    description: "Search for Azure resources with simple filters (type, location, resource group, name, tag) instead of writing KQL. The generated query is included in the result. Filter values are inserted into the query as written.",
                    input_schema: search_schema(),
                },
                handler: call_search,
            },
            ToolEntry {
                definition: ToolDefinition {
                    name: HISTORY_TOOL,
                    title: "Azure Resource Graph History",
                    description: "Query historical snapshots of Azure resources to track changes over time. Uses the preview resourcesHistory API.",
                    input_schema: history_schema(),
                },
                handler: call_history,
            },
            ToolEntry {
                definition: ToolDefinition {
                    name: OPERATIONS_TOOL,
                    title: "Azure Resource Graph Operations",
                    description: "List the operations supported by the Azure Resource Graph REST API with their descriptions.",
                    input_schema: operations_schema(),
                },
                handler: call_operations,
            },
        ];
        Self { entries }
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.entries.iter().map(|entry| &entry.definition)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.definitions().map(|definition| definition.name).collect()
    }

    pub async fn call(
        &self,
        tools: &GraphTools,
        name: &str,
        arguments: Value,
    ) -> Result<String, ValidationError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.definition.name == name)
            .ok_or_else(|| ValidationError::unknown_tool(name))?;
        (entry.handler)(tools, arguments).await
    }
}

fn call_query(tools: &GraphTools, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let request: QueryRequest = parse_arguments(arguments)?;
        Ok(tools.query(request).await)
    })
}

fn call_search(tools: &GraphTools, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let filter: SearchFilter = parse_arguments(arguments)?;
        Ok(tools.search_resources(filter).await)
    })
}

fn call_history(tools: &GraphTools, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let request: HistoryRequest = parse_arguments(arguments)?;
        Ok(tools.history(request).await)
    })
}

fn call_operations(tools: &GraphTools, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let request: OperationsRequest = parse_arguments(arguments)?;
        Ok(tools.operations(request).await)
    })
}

fn response_format_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["markdown", "json"],
        "default": "markdown",
        "description": "Output format: 'markdown' for readable text, 'json' for the raw API payload"
    })
}

fn scope_list_schema(description: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "maxItems": 1000,
        "description": description
    })
}

fn options_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "top": { "type": "integer", "minimum": 1, "maximum": 1000, "description": "Maximum rows to return" },
            "skip": { "type": "integer", "minimum": 0, "description": "Rows to skip" },
            "skip_token": { "type": "string", "description": "Continuation token from a previous page" },
            "allow_partial_scopes": { "type": "boolean", "default": false },
            "authorization_scope_filter": {
                "type": "string",
                "enum": ["AtScopeAndBelow", "AtScopeAndAbove", "AtScopeExact", "AtScopeAboveAndBelow"],
                "default": "AtScopeAndBelow"
            },
            "result_format": { "type": "string", "enum": ["table", "objectArray"], "default": "objectArray" }
        },
        "additionalProperties": false
    })
}

fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "minLength": 1, "maxLength": 10000, "description": "KQL query string" },
            "subscriptions": scope_list_schema("Subscription IDs to query"),
            "management_groups": scope_list_schema("Management group names to query"),
            "facets": {
                "type": "array",
                "maxItems": 10,
                "items": {
                    "type": "object",
                    "properties": {
                        "expression": { "type": "string", "description": "Column or expression to aggregate" },
                        "options": {
                            "type": "object",
                            "properties": {
                                "top": { "type": "integer", "minimum": 1, "maximum": 1000 },
                                "filter": { "type": "string" },
                                "sort_by": { "type": "string" },
                                "sort_order": { "type": "string", "enum": ["asc", "desc"], "default": "desc" }
                            },
                            "additionalProperties": false
                        }
                    },
                    "required": ["expression"],
                    "additionalProperties": false
                }
            },
            "options": options_schema(),
            "response_format": response_format_schema()
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

fn history_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "minLength": 1, "maxLength": 10000, "description": "KQL query for resource history" },
            "subscriptions": scope_list_schema("Subscription IDs to query"),
            "management_groups": scope_list_schema("Management group names to query"),
            "options": options_schema(),
            "interval": { "type": "string", "description": "ISO 8601 time interval, e.g. 'P7D'" },
            "response_format": response_format_schema()
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

fn search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "resource_type": { "type": "string", "description": "e.g. 'Microsoft.Compute/virtualMachines'" },
            "location": { "type": "string", "description": "Azure region, e.g. 'eastus'" },
            "resource_group": { "type": "string" },
            "name_filter": { "type": "string", "description": "Substring the resource name must contain" },
            "tag_filter": { "type": "string", "description": "'key=value' or a bare tag key" },
            "subscriptions": scope_list_schema("Subscription IDs to search"),
            "limit": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 50 },
            "include_properties": { "type": "boolean", "default": false },
            "response_format": response_format_schema()
        },
        "additionalProperties": false
    })
}

fn operations_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "response_format": response_format_schema()
        },
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests::{Captured, stub_tools, stub_upstream};

    #[test]
    fn registry_lists_the_four_tools_with_read_only_annotations() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.names(),
            vec![QUERY_TOOL, SEARCH_TOOL, HISTORY_TOOL, OPERATIONS_TOOL]
        );
        for definition in registry.definitions() {
            let value = definition.to_value();
            assert_eq!(value["annotations"]["readOnlyHint"], true);
            assert_eq!(value["annotations"]["destructiveHint"], false);
            assert_eq!(value["inputSchema"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_before_any_network_call() {
        let tools = stub_tools("http://127.0.0.1:9", "exit 1").await;
        let err = ToolRegistry::new()
            .call(&tools, "azure_resource_graph_delete", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, resgraph_core::error::codes::UNKNOWN_TOOL);
    }

    #[tokio::test]
    async fn invalid_arguments_surface_as_validation_errors() {
        let tools = stub_tools("http://127.0.0.1:9", "exit 1").await;
        let err = ToolRegistry::new()
            .call(&tools, QUERY_TOOL, json!({ "query": "" }))
            .await
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("query"));
    }

    #[tokio::test]
    async fn search_handler_dispatches_to_the_facade() {
        let upstream = stub_upstream(Captured::default()).await;
        let tools = stub_tools(&upstream, "echo token").await;
        let text = ToolRegistry::new()
            .call(&tools, SEARCH_TOOL, json!({ "location": "eastus" }))
            .await
            .unwrap();
        assert!(text.starts_with("# Azure Resource Search Results"));
        assert!(text.contains("# Search Results"));
    }
}
