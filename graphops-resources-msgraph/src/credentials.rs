//! Access tokens for the Graph API.
//!
//! A [`TokenCredential`] produces bearer tokens for a set of scopes.
//! [`credential_from_config`] assembles the credentials the provider
//! configuration enables into a [`ChainedTokenCredential`].

use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;

pub const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Requested from an OIDC provider that is not told otherwise.
const TOKEN_EXCHANGE_AUDIENCE: &str = "api://AzureADTokenExchange";

const ASSERTION: &str = "ClientAssertionCredential";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential is configured; set an access token, OIDC, a client secret, or enable the Azure CLI")]
    NotConfigured,

    #[error("{credential}: {message}")]
    Failed {
        credential: &'static str,
        message: String,
    },

    #[error("all credentials failed:{}", list(.0))]
    Chain(Vec<CredentialError>),
}

fn list(errors: &[CredentialError]) -> String {
    errors.iter().map(|e| format!("\n  - {}", e)).collect()
}

impl CredentialError {
    fn failed(credential: &'static str, message: impl fmt::Display) -> CredentialError {
        CredentialError::Failed {
            credential,
            message: message.to_string(),
        }
    }
}

/// A bearer token. Its `Debug` output does not reveal the token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> AccessToken {
        AccessToken {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_in(token: impl Into<String>, lifetime: Duration) -> AccessToken {
        AccessToken {
            token: token.into(),
            expires_at: Instant::now().checked_add(lifetime),
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    fn is_fresh(&self) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => Instant::now() + EXPIRY_MARGIN < at,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError>;
}

/// A token supplied up front, e.g. via `MSGRAPH_ACCESS_TOKEN`.
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scopes: &[String]) -> Result<AccessToken, CredentialError> {
        Ok(self.token.clone())
    }
}

#[derive(Default)]
struct TokenCache(Mutex<Option<(Vec<String>, AccessToken)>>);

impl TokenCache {
    fn get(&self, scopes: &[String]) -> Option<AccessToken> {
        let cached = self.0.lock().ok()?;
        match &*cached {
            Some((s, token)) if s == scopes && token.is_fresh() => Some(token.clone()),
            _ => None,
        }
    }

    fn put(&self, scopes: &[String], token: &AccessToken) {
        if let Ok(mut cached) = self.0.lock() {
            *cached = Some((scopes.to_vec(), token.clone()));
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Interpret a response of the identity platform's token endpoint.
fn parse_token_response(
    credential: &'static str,
    status: u16,
    body: &[u8],
) -> Result<AccessToken, CredentialError> {
    let response: TokenResponse = serde_json::from_slice(body).map_err(|e| {
        CredentialError::failed(
            credential,
            format!("unreadable token response (HTTP {}): {}", status, e),
        )
    })?;
    match response.access_token {
        Some(token) if (200..300).contains(&status) => Ok(match response.expires_in {
            Some(seconds) => AccessToken::expiring_in(token, Duration::from_secs(seconds)),
            None => AccessToken::new(token),
        }),
        _ => Err(CredentialError::failed(
            credential,
            format!(
                "token request failed with HTTP {}: {}: {}",
                status,
                response.error.as_deref().unwrap_or("unknown error"),
                response.error_description.as_deref().unwrap_or_default()
            ),
        )),
    }
}

/// POST an OAuth2 client-credentials grant for `tenant_id`.
async fn request_token(
    http: &reqwest::Client,
    credential: &'static str,
    tenant_id: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken, CredentialError> {
    let url = format!("{}/{}/oauth2/v2.0/token", AUTHORITY_HOST, tenant_id);
    debug!(credential, %url, "requesting token");
    let response = http
        .post(&url)
        .form(form)
        .send()
        .await
        .map_err(|e| CredentialError::failed(credential, e))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| CredentialError::failed(credential, e))?;
    parse_token_response(credential, status, &body)
}

/// A service principal authenticating with a client secret.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http,
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if let Some(token) = self.cache.get(scopes) {
            return Ok(token);
        }
        let scope = scopes.join(" ");
        let token = request_token(
            &self.http,
            "ClientSecretCredential",
            &self.tenant_id,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("scope", &scope),
            ],
        )
        .await?;
        self.cache.put(scopes, &token);
        Ok(token)
    }
}

/// Where a federated (OIDC) token comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum AssertionSource {
    Token(String),
    /// Re-read on every token request; the file may be rotated.
    File(PathBuf),
    /// Fetched from an OIDC provider, e.g. the GitHub Actions token endpoint.
    Request { url: String, token: String },
}

impl fmt::Debug for AssertionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionSource::Token(_) => f.write_str("Token(<redacted>)"),
            AssertionSource::File(path) => f.debug_tuple("File").field(path).finish(),
            AssertionSource::Request { url, .. } => f
                .debug_struct("Request")
                .field("url", url)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

impl AssertionSource {
    async fn read(&self, http: &reqwest::Client) -> Result<String, CredentialError> {
        match self {
            AssertionSource::Token(token) => Ok(token.clone()),
            AssertionSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|s| s.trim().to_string())
                .map_err(|e| {
                    CredentialError::failed(
                        ASSERTION,
                        format!("could not read OIDC token file {}: {}", path.display(), e),
                    )
                }),
            AssertionSource::Request { url, token } => {
                let url = assertion_request_url(url)?;
                debug!(%url, "requesting OIDC token");
                let response = http
                    .get(url)
                    .bearer_auth(token)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await
                    .map_err(|e| CredentialError::failed(ASSERTION, e))?;
                let status = response.status().as_u16();
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| CredentialError::failed(ASSERTION, e))?;
                parse_assertion_response(status, &body)
            }
        }
    }
}

/// `url` with the token exchange audience, unless it names one already.
fn assertion_request_url(url: &str) -> Result<reqwest::Url, CredentialError> {
    let mut url = reqwest::Url::parse(url).map_err(|e| {
        CredentialError::failed(ASSERTION, format!("invalid OIDC request URL: {}", e))
    })?;
    if !url
        .query_pairs()
        .any(|(key, value)| key == "audience" && !value.is_empty())
    {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "audience")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs)
            .append_pair("audience", TOKEN_EXCHANGE_AUDIENCE);
    }
    Ok(url)
}

#[derive(Deserialize)]
struct AssertionResponse {
    value: Option<String>,
}

fn parse_assertion_response(status: u16, body: &[u8]) -> Result<String, CredentialError> {
    if !(200..300).contains(&status) {
        return Err(CredentialError::failed(
            ASSERTION,
            format!(
                "OIDC token request failed with HTTP {}: {}",
                status,
                String::from_utf8_lossy(body)
            ),
        ));
    }
    let response: AssertionResponse = serde_json::from_slice(body).map_err(|e| {
        CredentialError::failed(ASSERTION, format!("unreadable OIDC token response: {}", e))
    })?;
    response
        .value
        .ok_or_else(|| CredentialError::failed(ASSERTION, "the OIDC provider returned no token"))
}

/// A service principal authenticating with a federated OIDC token.
pub struct ClientAssertionCredential {
    http: reqwest::Client,
    tenant_id: String,
    client_id: String,
    assertion: AssertionSource,
    cache: TokenCache,
}

impl ClientAssertionCredential {
    pub fn new(
        http: reqwest::Client,
        tenant_id: &str,
        client_id: &str,
        assertion: AssertionSource,
    ) -> Self {
        Self {
            http,
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            assertion,
            cache: TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenCredential for ClientAssertionCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if let Some(token) = self.cache.get(scopes) {
            return Ok(token);
        }
        let assertion = self.assertion.read(&self.http).await?;
        let scope = scopes.join(" ");
        let token = request_token(
            &self.http,
            ASSERTION,
            &self.tenant_id,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", &assertion),
                ("scope", &scope),
            ],
        )
        .await?;
        self.cache.put(scopes, &token);
        Ok(token)
    }
}

/// The account the Azure CLI (`az`) is logged in with.
pub struct AzureCliCredential {
    tenant_id: Option<String>,
    cache: TokenCache,
}

impl AzureCliCredential {
    pub fn new(tenant_id: Option<&str>) -> Self {
        Self {
            tenant_id: tenant_id.map(str::to_string),
            cache: TokenCache::default(),
        }
    }

    fn args(&self, scopes: &[String]) -> Vec<String> {
        let mut args: Vec<String> = ["account", "get-access-token", "--output", "json"]
            .into_iter()
            .map(String::from)
            .collect();
        if !scopes.is_empty() {
            args.push("--scope".to_string());
            args.extend(scopes.iter().cloned());
        }
        if let Some(tenant_id) = &self.tenant_id {
            args.push("--tenant".to_string());
            args.push(tenant_id.clone());
        }
        args
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Local time, e.g. `2026-10-16 12:00:00.000000`.
    expires_on: Option<String>,
    /// Seconds since the epoch. Only newer versions of az print it.
    #[serde(rename = "expires_on")]
    expires_on_timestamp: Option<i64>,
}

impl CliToken {
    fn expires_at(&self) -> Option<SystemTime> {
        if let Some(seconds) = self.expires_on_timestamp {
            return Some(UNIX_EPOCH + Duration::from_secs(u64::try_from(seconds).ok()?));
        }
        let local =
            NaiveDateTime::parse_from_str(self.expires_on.as_deref()?, "%Y-%m-%d %H:%M:%S%.f")
                .ok()?;
        local
            .and_local_timezone(Local)
            .earliest()
            .map(SystemTime::from)
    }
}

fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken, CredentialError> {
    let token: CliToken = serde_json::from_slice(stdout).map_err(|e| {
        CredentialError::failed(
            "AzureCliCredential",
            format!("unexpected output of az: {}", e),
        )
    })?;
    Ok(match token.expires_at() {
        Some(at) => AccessToken::expiring_in(
            token.access_token,
            at.duration_since(SystemTime::now()).unwrap_or_default(),
        ),
        None => AccessToken::new(token.access_token),
    })
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if let Some(token) = self.cache.get(scopes) {
            return Ok(token);
        }
        let args = self.args(scopes);
        debug!(?args, "running az");
        let output = tokio::process::Command::new("az")
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                CredentialError::failed("AzureCliCredential", format!("could not run az: {}", e))
            })?;
        if !output.status.success() {
            return Err(CredentialError::failed(
                "AzureCliCredential",
                format!(
                    "az exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        let token = parse_cli_output(&output.stdout)?;
        // without an expiry the token cannot be refreshed in time
        if token.expires_at.is_some() {
            self.cache.put(scopes, &token);
        }
        Ok(token)
    }
}

/// Tries each credential in turn; the first token wins.
pub struct ChainedTokenCredential {
    credentials: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedTokenCredential {
    pub fn new(credentials: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if self.credentials.is_empty() {
            return Err(CredentialError::NotConfigured);
        }
        let mut errors = Vec::new();
        for credential in &self.credentials {
            match credential.get_token(scopes).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    debug!(error = %e, "credential failed, trying the next one");
                    errors.push(e);
                }
            }
        }
        Err(CredentialError::Chain(errors))
    }
}

/// The credentials `config` enables, in the order they are tried: a static
/// access token, OIDC, a client secret, then the Azure CLI.
pub fn credential_from_config(
    config: &ProviderConfig,
    http: reqwest::Client,
) -> Result<ChainedTokenCredential, CredentialError> {
    let mut chain: Vec<Arc<dyn TokenCredential>> = Vec::new();

    if let Some(token) = &config.access_token {
        chain.push(Arc::new(StaticTokenCredential::new(token.as_str())));
    }

    if config.use_oidc {
        let (Some(tenant_id), Some(client_id)) = (&config.tenant_id, &config.client_id) else {
            return Err(CredentialError::failed(
                "ClientAssertionCredential",
                "OIDC requires tenant_id and client_id",
            ));
        };
        let assertion = match (
            &config.oidc_token,
            &config.oidc_token_file_path,
            &config.oidc_request_url,
            &config.oidc_request_token,
        ) {
            (Some(token), _, _, _) => AssertionSource::Token(token.clone()),
            (None, Some(path), _, _) => AssertionSource::File(path.into()),
            (None, None, Some(url), Some(token)) => AssertionSource::Request {
                url: url.clone(),
                token: token.clone(),
            },
            _ => {
                return Err(CredentialError::failed(
                    ASSERTION,
                    "OIDC requires oidc_token, oidc_token_file_path, or oidc_request_url with oidc_request_token",
                ))
            }
        };
        chain.push(Arc::new(ClientAssertionCredential::new(
            http.clone(),
            tenant_id,
            client_id,
            assertion,
        )));
    }

    if let (Some(tenant_id), Some(client_id), Some(secret)) =
        (&config.tenant_id, &config.client_id, &config.client_secret)
    {
        chain.push(Arc::new(ClientSecretCredential::new(
            http, tenant_id, client_id, secret,
        )));
    }

    if config.use_cli {
        chain.push(Arc::new(AzureCliCredential::new(config.tenant_id.as_deref())));
    }

    if chain.is_empty() {
        return Err(CredentialError::NotConfigured);
    }
    Ok(ChainedTokenCredential::new(chain))
}
