use std::time::Duration;

use reqwest::Method;
use resgraph_core::error::GraphError;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::auth::Credential;

pub const DEFAULT_API_BASE_URL: &str = "https://management.azure.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated caller of the Azure management API. One attempt per call.
#[derive(Debug, Clone)]
pub struct ResourceGraphClient {
    base_url: Url,
    http: reqwest::Client,
    timeout: Duration,
}

impl ResourceGraphClient {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url.trim_end_matches('/'))?,
            http: reqwest::Client::new(),
            timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Url, GraphError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{endpoint}"))
            .map_err(|e| GraphError::Transport(format!("invalid endpoint '{endpoint}': {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    pub async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        credential: &Credential,
        body: Option<&B>,
        query: &[(&str, &str)],
    ) -> Result<Value, GraphError> {
        let url = self.endpoint_url(endpoint, query)?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(credential.bearer())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(classify)?;

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown Status");
            let message = api_error_message(&bytes, reason);
            tracing::debug!(
                event = "upstream_request_failed",
                method = %method,
                endpoint,
                status = status.as_u16(),
            );
            return Err(GraphError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| GraphError::Transport(format!("invalid JSON in response: {e}")))
    }
}

fn classify(err: reqwest::Error) -> GraphError {
    if err.is_timeout() {
        GraphError::Timeout
    } else {
        GraphError::Transport(err.to_string())
    }
}

/// Prefers the ARM `error.message`; otherwise the reason phrase, with the
/// raw text appended when the body is not JSON.
fn api_error_message(bytes: &[u8], reason: &str) -> String {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(body) => body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| reason.to_string()),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            if text.is_empty() {
                reason.to_string()
            } else {
                format!("{reason}: {text}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialSource;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn credential() -> Credential {
        Credential::new("test-token", CredentialSource::AzureCli)
    }

    #[tokio::test]
    async fn sends_bearer_body_and_api_version() {
        let router = Router::new().route(
            "/providers/Microsoft.ResourceGraph/resources",
            post(
                |headers: HeaderMap,
                 Query(params): Query<HashMap<String, String>>,
                 Json(body): Json<Value>| async move {
                    Json(json!({
                        "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
                        "api_version": params.get("api-version"),
                        "echo": body,
                    }))
                },
            ),
        );
        let client = ResourceGraphClient::new(&spawn(router).await).unwrap();

        let body = json!({ "query": "Resources" });
        let response = client
            .execute(
                Method::POST,
                "/providers/Microsoft.ResourceGraph/resources",
                &credential(),
                Some(&body),
                &[("api-version", "2024-04-01")],
            )
            .await
            .unwrap();

        assert_eq!(response["authorization"], "Bearer test-token");
        assert_eq!(response["api_version"], "2024-04-01");
        assert_eq!(response["echo"], body);
    }

    #[tokio::test]
    async fn non_success_prefers_upstream_error_message() {
        let router = Router::new().route(
            "/denied",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "error": { "code": "AuthorizationFailed", "message": "No access to subscription" } })),
                )
            }),
        );
        let client = ResourceGraphClient::new(&spawn(router).await).unwrap();

        let err = client
            .execute::<Value>(Method::GET, "/denied", &credential(), None, &[])
            .await
            .unwrap_err();
        match err {
            GraphError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "No access to subscription");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_falls_back_to_reason_phrase() {
        let router = Router::new().route(
            "/broken",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
        );
        let client = ResourceGraphClient::new(&spawn(router).await).unwrap();

        let err = client
            .execute::<Value>(Method::GET, "/broken", &credential(), None, &[])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Azure API error (502): Bad Gateway: upstream exploded"
        );
    }

    #[tokio::test]
    async fn slow_upstream_is_a_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let client = ResourceGraphClient::new(&spawn(router).await)
            .unwrap()
            .with_timeout(Duration::from_millis(100));

        let err = client
            .execute::<Value>(Method::GET, "/slow", &credential(), None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Timeout));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ResourceGraphClient::new(&format!("http://{addr}")).unwrap();

        let err = client
            .execute::<Value>(Method::GET, "/anything", &credential(), None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
    }

    #[tokio::test]
    async fn unparseable_success_body_is_a_transport_error() {
        let router = Router::new().route("/html", get(|| async { "<html></html>" }));
        let client = ResourceGraphClient::new(&spawn(router).await).unwrap();

        let err = client
            .execute::<Value>(Method::GET, "/html", &credential(), None, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }
}
