//! Gateway Configuration
//!
//! Keys, endpoints and payload defaults, read from the process environment.

use secrecy::{ExposeSecret, SecretString};

use flow_core::{FlowError, Result};

use crate::credentials::GLOBAL_PAYMENTS_TOKEN_URL;

pub const DEFAULT_BASE_URL: &str = "https://api.sandbox.checkout.com";
pub const DEFAULT_TOKEN_URL: &str = "https://access.sandbox.checkout.com/connect/token";
pub const DEFAULT_TOKEN_SCOPE: &str =
    "payment-sessions sessions:browser sessions:app vault payments forward";
pub const DEFAULT_FORWARD_URL: &str = "https://forward.sandbox.checkout.com/forward";
pub const DEFAULT_PUBLIC_ORIGIN: &str = "http://localhost:3000";

/// Normalize a user-supplied API base URL
///
/// Blank input falls back to the sandbox URL. Trailing slashes are
/// stripped and `https://` is prepended when no scheme is given.
pub fn normalize_base_url(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_BASE_URL.to_string();
    };

    let trimmed = raw.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Trim a raw value; blank counts as unset
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read an environment variable, treating empty values as unset
pub fn env_opt(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

fn env_secret(name: &str) -> Option<SecretString> {
    env_opt(name).map(SecretString::new)
}

/// Credentials for the forwarding destinations
#[derive(Debug)]
pub struct DestinationSecrets {
    pub adyen_api_key: Option<SecretString>,
    pub adyen_merchant_account: Option<String>,
    pub stripe_secret_key: Option<SecretString>,
    pub global_payments_app_id: Option<String>,
    pub global_payments_app_key: Option<SecretString>,
    /// Global Payments access-token endpoint
    pub global_payments_token_url: String,
}

impl Default for DestinationSecrets {
    fn default() -> Self {
        Self {
            adyen_api_key: None,
            adyen_merchant_account: None,
            stripe_secret_key: None,
            global_payments_app_id: None,
            global_payments_app_key: None,
            global_payments_token_url: GLOBAL_PAYMENTS_TOKEN_URL.into(),
        }
    }
}

impl DestinationSecrets {
    pub fn from_env() -> Self {
        Self {
            adyen_api_key: env_secret("ADYEN_API_KEY"),
            adyen_merchant_account: env_opt("ADYEN_MERCHANT_ACCOUNT"),
            stripe_secret_key: env_secret("STRIPE_SECRET_KEY"),
            global_payments_app_id: env_opt("GLOBAL_PAYMENTS_APP_ID"),
            global_payments_app_key: env_secret("GLOBAL_PAYMENTS_APP_KEY"),
            global_payments_token_url: env_opt("GLOBAL_PAYMENTS_TOKEN_URL")
                .unwrap_or_else(|| GLOBAL_PAYMENTS_TOKEN_URL.into()),
        }
    }
}

/// Look up a required secret, naming the variable when it is missing
pub(crate) fn require_secret<'a>(value: Option<&'a SecretString>, var: &str) -> Result<&'a str> {
    value
        .map(|s| s.expose_secret().as_str())
        .ok_or_else(|| FlowError::Configuration(format!("{var} is not configured")))
}

pub(crate) fn require<'a>(value: Option<&'a String>, var: &str) -> Result<&'a str> {
    value
        .map(String::as_str)
        .ok_or_else(|| FlowError::Configuration(format!("{var} is not configured")))
}

/// Gateway configuration
#[derive(Debug)]
pub struct GatewayConfig {
    /// Payments API base URL, already normalized
    pub base_url: String,

    /// OAuth client-credentials token endpoint
    pub token_url: String,

    /// Scope requested with the client-credentials grant
    pub token_scope: String,

    /// Forward API endpoint
    pub forward_url: String,

    /// Public key handed to the browser SDK
    pub public_key: Option<String>,

    /// Static secret key, used when no OAuth token is available
    pub secret_key: Option<SecretString>,

    /// OAuth client id
    pub access_key_id: Option<String>,

    /// OAuth client secret
    pub access_key_secret: Option<SecretString>,

    /// Processing channel attached to outbound payloads
    pub processing_channel_id: Option<String>,

    /// Customer attached to payment sessions and instruments
    pub customer_id: Option<String>,

    /// Origin used to build default redirect URLs
    pub public_origin: String,

    pub destinations: DestinationSecrets,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            token_scope: DEFAULT_TOKEN_SCOPE.into(),
            forward_url: DEFAULT_FORWARD_URL.into(),
            public_key: None,
            secret_key: None,
            access_key_id: None,
            access_key_secret: None,
            processing_channel_id: None,
            customer_id: None,
            public_origin: DEFAULT_PUBLIC_ORIGIN.into(),
            destinations: DestinationSecrets::default(),
        }
    }
}

impl GatewayConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self {
            base_url: normalize_base_url(env_opt("BASE_URL").as_deref()),
            token_url: env_opt("ACCESS_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
            token_scope: env_opt("ACCESS_TOKEN_SCOPE")
                .unwrap_or_else(|| DEFAULT_TOKEN_SCOPE.into()),
            forward_url: env_opt("FORWARD_URL").unwrap_or_else(|| DEFAULT_FORWARD_URL.into()),
            public_key: env_opt("PUBLIC_KEY"),
            secret_key: env_secret("SECRET_KEY"),
            access_key_id: env_opt("ACCESS_KEY_ID"),
            access_key_secret: env_secret("ACCESS_KEY_SECRET"),
            processing_channel_id: env_opt("PROCESSING_CHANNEL_ID"),
            customer_id: env_opt("CUSTOMER_ID"),
            public_origin: env_opt("PUBLIC_ORIGIN")
                .map(|o| o.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_PUBLIC_ORIGIN.into()),
            destinations: DestinationSecrets::from_env(),
        }
    }

    /// Whether OAuth client credentials are present
    pub const fn oauth_configured(&self) -> bool {
        self.access_key_id.is_some() && self.access_key_secret.is_some()
    }

    /// Absolute URL for an API path such as `/payment-sessions`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Redirect URL on the public origin
    pub fn origin_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.public_origin, path_and_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_default() {
        assert_eq!(normalize_base_url(None), DEFAULT_BASE_URL);
        assert_eq!(normalize_base_url(Some("   ")), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_base_url_strips_trailing_slashes() {
        assert_eq!(
            normalize_base_url(Some("https://api.checkout.com///")),
            "https://api.checkout.com"
        );
    }

    #[test]
    fn test_base_url_adds_scheme() {
        assert_eq!(
            normalize_base_url(Some(" api.sandbox.checkout.com/ ")),
            "https://api.sandbox.checkout.com"
        );
        assert_eq!(
            normalize_base_url(Some("http://localhost:8080")),
            "http://localhost:8080"
        );
    }

    #[test]
    fn test_oauth_configured_requires_both_halves() {
        let mut config = GatewayConfig {
            access_key_id: Some("ack_123".into()),
            ..Default::default()
        };
        assert!(!config.oauth_configured());

        config.access_key_secret = Some(SecretString::new("shh".into()));
        assert!(config.oauth_configured());
    }

    #[test]
    fn test_require_names_missing_variable() {
        let err = require_secret(None, "STRIPE_SECRET_KEY").unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: STRIPE_SECRET_KEY is not configured");
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(Some(" 0.0.0.0:8080 ".into())).as_deref(), Some("0.0.0.0:8080"));
    }

    #[test]
    fn test_global_payments_token_url_default() {
        assert_eq!(
            DestinationSecrets::default().global_payments_token_url,
            GLOBAL_PAYMENTS_TOKEN_URL
        );
    }

    #[test]
    fn test_urls() {
        let config = GatewayConfig::default();
        assert_eq!(
            config.api_url("/payment-sessions"),
            "https://api.sandbox.checkout.com/payment-sessions"
        );
        assert_eq!(config.origin_url("/?status=failed"), "http://localhost:3000/?status=failed");
    }
}
