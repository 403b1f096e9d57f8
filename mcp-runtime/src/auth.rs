use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use resgraph_core::error::GraphError;
use serde::Deserialize;
use tokio::process::Command;

pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
pub const DEFAULT_MANAGED_IDENTITY_ENDPOINT: &str =
    "http://169.254.169.254/metadata/identity/oauth2/token";
pub const MANAGED_IDENTITY_API_VERSION: &str = "2018-02-01";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_AZ_CLI: &str = "az";

const MANAGED_IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
const CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// Which strategy of the chain produced a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ManagedIdentity,
    ClientSecret,
    AzureCli,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialSource::ManagedIdentity => "managed_identity",
            CredentialSource::ClientSecret => "client_secret",
            CredentialSource::AzureCli => "azure_cli",
        }
    }
}

/// Bearer token for the management API. Lives for one tool invocation.
#[derive(Clone)]
pub struct Credential {
    token: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(token: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            token: token.into(),
            source,
        }
    }

    pub fn bearer(&self) -> &str {
        &self.token
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn token_len(&self) -> usize {
        self.token.len()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Service principal secret for the client-credentials grant.
#[derive(Clone)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

impl ClientSecret {
    /// `Some` only when all three values are present and non-empty.
    pub fn from_parts(
        client_id: Option<&str>,
        client_secret: Option<&str>,
        tenant_id: Option<&str>,
    ) -> Option<Self> {
        fn present(value: Option<&str>) -> Option<&str> {
            value.filter(|v| !v.trim().is_empty())
        }
        Some(Self {
            client_id: present(client_id)?.to_string(),
            client_secret: present(client_secret)?.to_string(),
            tenant_id: present(tenant_id)?.to_string(),
        })
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Command line that prints an access token on stdout.
#[derive(Debug, Clone)]
pub struct CliCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CliCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `az account get-access-token` for the management resource.
    pub fn azure(program: impl Into<String>) -> Self {
        Self::new(
            program,
            [
                "account",
                "get-access-token",
                "--resource",
                MANAGEMENT_RESOURCE,
                "--query",
                "accessToken",
                "--output",
                "tsv",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub managed_identity_endpoint: String,
    /// Selects a user-assigned identity.
    pub managed_identity_client_id: Option<String>,
    pub authority_host: String,
    pub client_secret: Option<ClientSecret>,
    pub cli: CliCommand,
    pub managed_identity_timeout: Duration,
    pub token_exchange_timeout: Duration,
    pub cli_timeout: Duration,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            managed_identity_endpoint: DEFAULT_MANAGED_IDENTITY_ENDPOINT.to_string(),
            managed_identity_client_id: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            client_secret: None,
            cli: CliCommand::azure(DEFAULT_AZ_CLI),
            managed_identity_timeout: MANAGED_IDENTITY_TIMEOUT,
            token_exchange_timeout: TOKEN_EXCHANGE_TIMEOUT,
            cli_timeout: CLI_TIMEOUT,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Managed identity, then client secret, then the local CLI. Nothing is
/// cached: every call walks the chain again.
#[derive(Debug, Clone)]
pub struct CredentialChain {
    config: CredentialConfig,
    http: reqwest::Client,
}

impl CredentialChain {
    pub fn new(config: CredentialConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    pub async fn acquire(&self) -> Result<Credential, GraphError> {
        let mut failures = Vec::new();

        match self.managed_identity().await {
            Ok(token) => return Ok(Credential::new(token, CredentialSource::ManagedIdentity)),
            Err(reason) => {
                tracing::debug!(
                    event = "credential_strategy_failed",
                    strategy = CredentialSource::ManagedIdentity.as_str(),
                    reason = %reason,
                );
                failures.push(format!("managed identity: {reason}"));
            }
        }

        match &self.config.client_secret {
            Some(secret) => match self.client_secret(secret).await {
                Ok(token) => return Ok(Credential::new(token, CredentialSource::ClientSecret)),
                Err(reason) => {
                    tracing::warn!(
                        event = "credential_strategy_failed",
                        strategy = CredentialSource::ClientSecret.as_str(),
                        tenant_id = %secret.tenant_id,
                        reason = %reason,
                    );
                    failures.push(format!("client secret: {reason}"));
                }
            },
            None => failures.push(
                "client secret: AZURE_CLIENT_ID, AZURE_CLIENT_SECRET and AZURE_TENANT_ID not all set"
                    .to_string(),
            ),
        }

        match self.cli_token().await {
            Ok(token) => return Ok(Credential::new(token, CredentialSource::AzureCli)),
            Err(reason) => {
                tracing::debug!(
                    event = "credential_strategy_failed",
                    strategy = CredentialSource::AzureCli.as_str(),
                    reason = %reason,
                );
                failures.push(format!("azure cli: {reason}"));
            }
        }

        Err(GraphError::Auth(format!(
            "Failed to obtain Azure credentials. Run 'az login' or set AZURE_CLIENT_ID, \
             AZURE_CLIENT_SECRET and AZURE_TENANT_ID. Attempts: {}",
            failures.join("; ")
        )))
    }

    async fn managed_identity(&self) -> Result<String, String> {
        let mut request = self
            .http
            .get(&self.config.managed_identity_endpoint)
            .query(&[
                ("api-version", MANAGED_IDENTITY_API_VERSION),
                ("resource", MANAGEMENT_RESOURCE),
            ])
            .header("Metadata", "true")
            .timeout(self.config.managed_identity_timeout);
        if let Some(client_id) = &self.config.managed_identity_client_id {
            request = request.query(&[("client_id", client_id.as_str())]);
        }
        read_token(request).await
    }

    async fn client_secret(&self, secret: &ClientSecret) -> Result<String, String> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_host.trim_end_matches('/'),
            secret.tenant_id
        );
        let request = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .timeout(self.config.token_exchange_timeout);
        read_token(request).await
    }

    async fn cli_token(&self) -> Result<String, String> {
        let cli = &self.config.cli;
        let output = Command::new(&cli.program)
            .args(&cli.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.config.cli_timeout, output)
            .await
            .map_err(|_| {
                format!(
                    "'{}' timed out after {}s",
                    cli.display(),
                    self.config.cli_timeout.as_secs_f32()
                )
            })?
            .map_err(|e| format!("failed to run '{}': {e}", cli.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "'{}' exited with {}: {}",
                cli.display(),
                output.status,
                stderr.trim()
            ));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(format!("'{}' printed no token", cli.display()));
        }
        Ok(token)
    }
}

async fn read_token(request: reqwest::RequestBuilder) -> Result<String, String> {
    let response = request.send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("HTTP {}: {}", status.as_u16(), body.trim()));
    }
    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| format!("invalid token response: {e}"))?;
    if token.access_token.is_empty() {
        return Err("token response carried an empty access_token".to_string());
    }
    Ok(token.access_token)
}
