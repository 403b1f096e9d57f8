use reqwest::Method;
use resgraph_core::error::GraphError;
use resgraph_core::format::{format_operations, format_response, format_search_response};
use resgraph_core::query::build_search_query;
use resgraph_core::requests::{HistoryRequest, OperationsRequest, QueryRequest, SearchFilter};
use resgraph_core::wire::QueryBody;
use serde_json::Value;

use crate::auth::{Credential, CredentialChain};
use crate::client::ResourceGraphClient;

pub const RESOURCES_ENDPOINT: &str = "/providers/Microsoft.ResourceGraph/resources";
pub const HISTORY_ENDPOINT: &str = "/providers/Microsoft.ResourceGraph/resourcesHistory";
pub const OPERATIONS_ENDPOINT: &str = "/providers/Microsoft.ResourceGraph/operations";

pub const RESOURCES_API_VERSION: &str = "2024-04-01";
pub const HISTORY_API_VERSION: &str = "2021-06-01-preview";
pub const OPERATIONS_API_VERSION: &str = "2022-10-01";

const QUERY_TITLE: &str = "Azure Resource Graph Query Results";
const HISTORY_TITLE: &str = "Azure Resource History Results";

struct Failure {
    context: &'static str,
    tips: &'static [&'static str],
}

const QUERY_FAILURE: Failure = Failure {
    context: "Failed to execute Azure Resource Graph query",
    tips: &[
        "Ensure you're logged in with 'az login'",
        "Check your query syntax",
        "Verify subscription/management group access",
        "Try reducing scope or adding filters",
    ],
};

const HISTORY_FAILURE: Failure = Failure {
    context: "Failed to query Azure Resource Graph history",
    tips: &[
        "Resource history is in preview and may have limited availability",
        "Ensure you have proper permissions for historical data access",
        "Try a simpler query or shorter time interval",
    ],
};

const OPERATIONS_FAILURE: Failure = Failure {
    context: "Failed to list Azure Resource Graph operations",
    tips: &[
        "Ensure you're logged in with 'az login' or that AZURE_CLIENT_ID, AZURE_CLIENT_SECRET and AZURE_TENANT_ID are set",
        "Check network connectivity to management.azure.com",
    ],
};

const SEARCH_FAILURE: Failure = Failure {
    context: "Failed to search Azure resources",
    tips: &[
        "Check your search criteria",
        "Ensure you have access to the specified subscriptions",
        "Try broadening your search filters",
    ],
};

/// The four Resource Graph operations. Each one returns display text;
/// failures are rendered into that text instead of being returned.
#[derive(Debug, Clone)]
pub struct GraphTools {
    credentials: CredentialChain,
    client: ResourceGraphClient,
}

impl GraphTools {
    pub fn new(credentials: CredentialChain, client: ResourceGraphClient) -> Self {
        Self {
            credentials,
            client,
        }
    }

    pub fn credentials(&self) -> &CredentialChain {
        &self.credentials
    }

    pub async fn query(&self, request: QueryRequest) -> String {
        let format = request.response_format;
        let body = QueryBody::from(request);
        match self
            .post(RESOURCES_ENDPOINT, RESOURCES_API_VERSION, &body)
            .await
        {
            Ok(response) => format_response(&response, format, QUERY_TITLE),
            Err(err) => render_failure(&QUERY_FAILURE, &err),
        }
    }

    pub async fn history(&self, request: HistoryRequest) -> String {
        let format = request.response_format;
        let body = QueryBody::from(request);
        match self.post(HISTORY_ENDPOINT, HISTORY_API_VERSION, &body).await {
            Ok(response) => format_response(&response, format, HISTORY_TITLE),
            Err(err) => render_failure(&HISTORY_FAILURE, &err),
        }
    }

    pub async fn search_resources(&self, filter: SearchFilter) -> String {
        let generated_query = build_search_query(&filter);
        tracing::debug!(event = "search_query_built", query = %generated_query);
        let body = QueryBody::for_search(&filter, generated_query.clone());
        match self
            .post(RESOURCES_ENDPOINT, RESOURCES_API_VERSION, &body)
            .await
        {
            Ok(response) => format_search_response(response, &filter, &generated_query),
            Err(err) => render_failure(&SEARCH_FAILURE, &err),
        }
    }

    pub async fn operations(&self, request: OperationsRequest) -> String {
        match self.list_operations().await {
            Ok(response) => format_operations(&response, request.response_format),
            Err(err) => render_failure(&OPERATIONS_FAILURE, &err),
        }
    }

    /// Raw operations listing with a caller-supplied credential.
    pub async fn list_operations_with(&self, credential: &Credential) -> Result<Value, GraphError> {
        self.client
            .execute::<()>(
                Method::GET,
                OPERATIONS_ENDPOINT,
                credential,
                None,
                &[("api-version", OPERATIONS_API_VERSION)],
            )
            .await
    }

    async fn list_operations(&self) -> Result<Value, GraphError> {
        let credential = self.credentials.acquire().await?;
        self.list_operations_with(&credential).await
    }

    async fn post(
        &self,
        endpoint: &str,
        api_version: &str,
        body: &QueryBody,
    ) -> Result<Value, GraphError> {
        let credential = self.credentials.acquire().await?;
        self.client
            .execute(
                Method::POST,
                endpoint,
                &credential,
                Some(body),
                &[("api-version", api_version)],
            )
            .await
    }
}

fn render_failure(failure: &Failure, err: &GraphError) -> String {
    tracing::error!(
        event = "tool_failed",
        error_code = err.code(),
        error = %err,
        "{}",
        failure.context
    );
    let tips: Vec<String> = failure.tips.iter().map(|tip| format!("- {tip}")).collect();
    format!(
        "❌ **Error:** {}: {err}\n\n💡 **Tips:**\n{}",
        failure.context,
        tips.join("\n")
    )
}
