//! Bearer Token Model
//!
//! A token endpoint grant and the cached form it is kept in.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 14_400;

/// Tokens are treated as expired this long before the endpoint says so
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token endpoint response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Bearer token value
    pub access_token: String,

    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
        }
    }
}

/// A token held in memory until `expires_at`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Build the cache entry for a grant received at `now`
    pub fn from_grant(grant: TokenGrant, now: DateTime<Utc>) -> Self {
        let lifetime = grant.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let lifetime = i64::try_from(lifetime)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        let expires_at = now
            .checked_add_signed(Duration::seconds(lifetime - EXPIRY_MARGIN_SECS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            value: grant.access_token,
            expires_at,
        }
    }

    /// Usable while `now < expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}
