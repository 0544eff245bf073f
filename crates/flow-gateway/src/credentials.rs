//! Bearer Token Cache
//!
//! Lazily obtains access tokens and reuses them until shortly before they
//! expire. The same cache type fronts the payments API's OAuth
//! client-credentials endpoint and the Global Payments access-token
//! endpoint; only the `TokenFetcher` differs.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use flow_core::{CachedToken, FlowError, Result, TokenGrant};

pub const GLOBAL_PAYMENTS_TOKEN_URL: &str = "https://apis.sandbox.globalpay.com/ucp/accesstoken";
pub const GLOBAL_PAYMENTS_API_VERSION: &str = "2021-03-22";

/// Source of fresh access tokens
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Request a new token from the issuing endpoint
    async fn fetch(&self) -> Result<TokenGrant>;
}

/// Process-wide token cache
///
/// The lock is never held across an await, so two callers that miss at the
/// same time may both fetch; whichever finishes last is kept.
pub struct CredentialCache {
    fetcher: Option<Arc<dyn TokenFetcher>>,
    cached: Mutex<Option<CachedToken>>,
}

impl CredentialCache {
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            fetcher: Some(fetcher),
            cached: Mutex::new(None),
        }
    }

    /// A cache with no token source; always yields `None`
    pub fn disabled() -> Self {
        Self {
            fetcher: None,
            cached: Mutex::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.fetcher.is_some()
    }

    /// Current access token, fetching one if the cache is empty or stale
    ///
    /// `Ok(None)` means no token source is configured and the caller should
    /// fall back to a static key.
    pub async fn get_access_token(&self) -> Result<Option<String>> {
        let Some(fetcher) = &self.fetcher else {
            return Ok(None);
        };

        if let Some(value) = self.cached_value() {
            return Ok(Some(value));
        }

        tracing::debug!("Access token missing or expired, requesting a new one");
        let grant = fetcher.fetch().await?;
        let token = CachedToken::from_grant(grant, Utc::now());
        let value = token.value.clone();

        tracing::info!(expires_at = %token.expires_at, "Cached new access token");
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);

        Ok(Some(value))
    }

    fn cached_value(&self) -> Option<String> {
        let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|token| token.is_valid())
            .map(|token| token.value.clone())
    }
}

async fn read_error_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

/// OAuth 2.0 client-credentials grant against the payments API
pub struct ClientCredentialsFetcher {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
}

impl ClientCredentialsFetcher {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            scope: scope.into(),
        }
    }
}

#[async_trait]
impl TokenFetcher for ClientCredentialsFetcher {
    async fn fetch(&self) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FlowError::UpstreamRelay(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            tracing::error!(status = status.as_u16(), %body, "Access token request rejected");
            return Err(FlowError::UpstreamAuth {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| FlowError::UpstreamRelay(format!("Malformed token response: {e}")))
    }
}

#[derive(Serialize)]
struct GlobalPaymentsTokenRequest<'a> {
    app_id: &'a str,
    nonce: String,
    secret: String,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct GlobalPaymentsTokenResponse {
    token: String,
    #[serde(default)]
    seconds_to_expire: Option<u64>,
}

/// `secret` field of a Global Payments token request: SHA-512 of nonce + app key
pub fn global_payments_secret(nonce: &str, app_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(nonce.as_bytes());
    hasher.update(app_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Access-token grant for the Global Payments forwarding destination
pub struct GlobalPaymentsTokenFetcher {
    http: reqwest::Client,
    token_url: String,
    app_id: String,
    app_key: SecretString,
}

impl GlobalPaymentsTokenFetcher {
    pub fn new(http: reqwest::Client, app_id: impl Into<String>, app_key: SecretString) -> Self {
        Self {
            http,
            token_url: GLOBAL_PAYMENTS_TOKEN_URL.into(),
            app_id: app_id.into(),
            app_key,
        }
    }

    /// Point the fetcher at a different access-token endpoint
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

#[async_trait]
impl TokenFetcher for GlobalPaymentsTokenFetcher {
    async fn fetch(&self) -> Result<TokenGrant> {
        let nonce = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        let request = GlobalPaymentsTokenRequest {
            app_id: &self.app_id,
            secret: global_payments_secret(&nonce, self.app_key.expose_secret()),
            nonce,
            grant_type: "client_credentials",
        };

        let response = self
            .http
            .post(&self.token_url)
            .header("X-GP-Version", GLOBAL_PAYMENTS_API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| FlowError::UpstreamRelay(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            tracing::error!(status = status.as_u16(), %body, "Global Payments token request rejected");
            return Err(FlowError::UpstreamAuth {
                status: status.as_u16(),
                body,
            });
        }

        let grant = response
            .json::<GlobalPaymentsTokenResponse>()
            .await
            .map_err(|e| FlowError::UpstreamRelay(format!("Malformed token response: {e}")))?;

        Ok(TokenGrant::new(grant.token, grant.seconds_to_expire))
    }
}
