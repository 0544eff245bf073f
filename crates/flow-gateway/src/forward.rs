//! Forward API Envelope
//!
//! The browser names a destination and a vaulted credential; the envelope
//! tells the processor which credential to detokenize and which request to
//! replay against the destination.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use flow_core::{FlowError, Result};

use crate::destinations::DestinationRequest;

/// Browser request to forward a credential
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    pub destination: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub instrument_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub reference: Option<String>,
    /// 3DS session body the browser already fetched
    #[serde(default)]
    pub auth_details: Option<Value>,
    /// 3DS session to look up when `auth_details` is absent
    #[serde(default)]
    pub auth_session_id: Option<String>,
}

/// A vaulted credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VaultSource {
    /// Single-use card token (`tok_...`)
    Token { token: String },
    /// Stored instrument (`src_...`)
    Id { id: String },
}

impl VaultSource {
    /// Pick the credential from a forward request
    ///
    /// Exactly one of `token` and `instrument_id` must be present and carry
    /// the matching prefix.
    pub fn resolve(token: Option<&str>, instrument_id: Option<&str>) -> Result<Self> {
        let token = token.filter(|t| !t.is_empty());
        let instrument_id = instrument_id.filter(|i| !i.is_empty());

        match (token, instrument_id) {
            (Some(token), None) if token.starts_with("tok_") => Ok(Self::Token {
                token: token.to_string(),
            }),
            (None, Some(id)) if id.starts_with("src_") => Ok(Self::Id { id: id.to_string() }),
            (Some(_), Some(_)) => Err(FlowError::InvalidRequest(
                "Provide either token or instrumentId, not both".into(),
            )),
            (None, None) => Err(FlowError::InvalidRequest(
                "token or instrumentId is required".into(),
            )),
            _ => Err(FlowError::InvalidRequest(
                "Expected a tok_ token or a src_ instrument id".into(),
            )),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Id { .. } => "instrument",
        }
    }
}

/// Body posted to the forward API
#[derive(Clone, Debug, Serialize)]
pub struct ForwardEnvelope {
    pub source: VaultSource,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_channel_id: Option<String>,
    pub destination_request: DestinationRequest,
}
