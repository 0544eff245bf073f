//! Payments API Client
//!
//! Issues authenticated calls against the payments API and captures the
//! upstream status and JSON body so handlers can relay them unchanged.

use std::sync::Arc;

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use serde_json::Value;

use flow_core::{FlowError, Result};

use crate::config::GatewayConfig;
use crate::credentials::{ClientCredentialsFetcher, CredentialCache};

/// Status and body returned by an upstream call
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// `id` field of the body, if the upstream returned one
    pub fn id(&self) -> Option<&str> {
        self.body.get("id").and_then(Value::as_str)
    }

    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| FlowError::UpstreamRelay(e.to_string()))?;

        Ok(Self::new(status, parse_body(&text)))
    }
}

impl Serialize for UpstreamResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// Parse an upstream body; empty or non-JSON bodies become `{}`
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Null) => Value::Object(serde_json::Map::new()),
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Upstream returned a non-JSON body");
            Value::Object(serde_json::Map::new())
        }
    }
}

/// Authenticated client for the payments API
pub struct CheckoutClient {
    http: reqwest::Client,
    config: Arc<GatewayConfig>,
    tokens: CredentialCache,
}

impl CheckoutClient {
    /// Create a client, enabling OAuth when client credentials are configured
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        let http = reqwest::Client::new();

        let tokens = match (&config.access_key_id, &config.access_key_secret) {
            (Some(id), Some(secret)) => CredentialCache::new(Arc::new(ClientCredentialsFetcher::new(
                http.clone(),
                config.token_url.clone(),
                id.clone(),
                SecretString::new(secret.expose_secret().clone()),
                config.token_scope.clone(),
            ))),
            _ => CredentialCache::disabled(),
        };

        Self {
            http,
            config,
            tokens,
        }
    }

    /// Create a client with an explicit token cache
    pub fn with_tokens(config: Arc<GatewayConfig>, tokens: CredentialCache) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            tokens,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn oauth_configured(&self) -> bool {
        self.tokens.is_configured()
    }

    /// Bearer credential: OAuth token first, static secret key as fallback
    pub async fn bearer(&self) -> Result<String> {
        if let Some(token) = self.tokens.get_access_token().await? {
            return Ok(token);
        }

        self.config
            .secret_key
            .as_ref()
            .map(|key| key.expose_secret().clone())
            .ok_or_else(|| {
                FlowError::Configuration(
                    "No API credentials configured: set ACCESS_KEY_ID and ACCESS_KEY_SECRET, or SECRET_KEY"
                        .into(),
                )
            })
    }

    /// POST a JSON body to an API path
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<UpstreamResponse> {
        let url = self.config.api_url(path);
        self.post_url(&url, body).await
    }

    /// POST a JSON body to an absolute URL
    pub async fn post_url<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<UpstreamResponse> {
        self.send("POST", url, self.http.post(url).json(body)).await
    }

    /// GET an API path
    pub async fn get(&self, path: &str) -> Result<UpstreamResponse> {
        let url = self.config.api_url(path);
        self.send("GET", &url, self.http.get(&url)).await
    }

    async fn send(&self, method: &str, url: &str, request: RequestBuilder) -> Result<UpstreamResponse> {
        let bearer = self.bearer().await?;

        let response = request.bearer_auth(bearer).send().await.map_err(|e| {
            tracing::error!(method, url, error = %e, "Upstream request failed");
            FlowError::UpstreamRelay(e.to_string())
        })?;

        let relayed = UpstreamResponse::read(response).await?;
        if relayed.is_success() {
            tracing::info!(method, url, status = relayed.status, "Upstream call completed");
        } else {
            tracing::warn!(method, url, status = relayed.status, body = %relayed.body, "Upstream call returned an error status");
        }

        Ok(relayed)
    }
}
