//! Forwarding Destinations
//!
//! Typed request builders for the third-party acquirers a vaulted card can
//! be forwarded to. Card data never passes through this service: bodies
//! carry the forward API's placeholders, which the processor substitutes
//! with the real card details on its side.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use flow_core::{FlowError, Result};

use crate::config::{require, require_secret, DestinationSecrets};
use crate::credentials::GLOBAL_PAYMENTS_API_VERSION;

pub const CARD_NUMBER: &str = "{{card_number}}";
pub const CARD_EXPIRY_MONTH: &str = "{{card_expiry_month}}";
pub const CARD_EXPIRY_YEAR: &str = "{{card_expiry_year_yyyy}}";

pub const ADYEN_PAYMENTS_URL: &str = "https://checkout-test.adyen.com/v71/payments";
pub const STRIPE_PAYMENT_INTENTS_URL: &str = "https://api.stripe.com/v1/payment_intents";
pub const GLOBAL_PAYMENTS_TRANSACTIONS_URL: &str =
    "https://apis.sandbox.globalpay.com/ucp/transactions";

/// Supported forwarding destinations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    Adyen,
    Stripe,
    GlobalPayments,
}

impl Destination {
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Adyen => "Adyen",
            Self::Stripe => "Stripe",
            Self::GlobalPayments => "Global Payments",
        }
    }

    /// Resolve this destination's secrets, failing on the first missing one
    pub fn credentials<'a>(&self, secrets: &'a DestinationSecrets) -> Result<DestinationCredentials<'a>> {
        match self {
            Self::Adyen => Ok(DestinationCredentials::Adyen {
                api_key: require_secret(secrets.adyen_api_key.as_ref(), "ADYEN_API_KEY")?,
                merchant_account: require(
                    secrets.adyen_merchant_account.as_ref(),
                    "ADYEN_MERCHANT_ACCOUNT",
                )?,
            }),
            Self::Stripe => Ok(DestinationCredentials::Stripe {
                secret_key: require_secret(secrets.stripe_secret_key.as_ref(), "STRIPE_SECRET_KEY")?,
            }),
            Self::GlobalPayments => {
                require(secrets.global_payments_app_id.as_ref(), "GLOBAL_PAYMENTS_APP_ID")?;
                require_secret(secrets.global_payments_app_key.as_ref(), "GLOBAL_PAYMENTS_APP_KEY")?;
                Ok(DestinationCredentials::GlobalPayments)
            }
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Destination {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "adyen" => Ok(Self::Adyen),
            "stripe" => Ok(Self::Stripe),
            "globalpayments" => Ok(Self::GlobalPayments),
            _ => Err(FlowError::UnknownDestination(s.trim().to_string())),
        }
    }
}

/// Secrets needed to build one destination's request
///
/// Global Payments authenticates with an access token obtained separately,
/// so its variant only records that the app credentials are present.
#[derive(Debug)]
pub enum DestinationCredentials<'a> {
    Adyen {
        api_key: &'a str,
        merchant_account: &'a str,
    },
    Stripe {
        secret_key: &'a str,
    },
    GlobalPayments,
}

/// 3-D Secure proof attached to a forwarded authorization
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationDetails {
    pub cryptogram: Option<String>,
    pub eci: Option<String>,
    pub version: Option<String>,
    pub ds_transaction_id: Option<String>,
}

impl AuthenticationDetails {
    /// Extract from a 3DS session body; `None` if it carries no proof
    pub fn from_session(session: &Value) -> Option<Self> {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

        let details = Self {
            cryptogram: text(session.get("cryptogram")),
            eci: text(session.get("eci")),
            version: text(session.get("protocol_version")).or_else(|| text(session.get("version"))),
            ds_transaction_id: text(session.pointer("/ds/transaction_id"))
                .or_else(|| text(session.get("ds_transaction_id"))),
        };

        if details.cryptogram.is_none() && details.eci.is_none() {
            None
        } else {
            Some(details)
        }
    }
}

/// Amount and reference of the forwarded authorization
#[derive(Clone, Copy, Debug)]
pub struct PaymentDetails<'a> {
    pub amount: i64,
    pub currency: &'a str,
    pub reference: &'a str,
    pub authentication: Option<&'a AuthenticationDetails>,
}

/// Headers sent to the destination
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DestinationHeaders {
    pub raw: BTreeMap<String, String>,
}

impl DestinationHeaders {
    fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.raw.insert(name.to_string(), value.into());
        self
    }
}

/// The request the forward API replays against the destination
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DestinationRequest {
    pub url: String,
    pub method: &'static str,
    pub headers: DestinationHeaders,
    pub body: String,
}

// ============================================================================
// Adyen
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdyenPayment<'a> {
    amount: AdyenAmount<'a>,
    reference: &'a str,
    merchant_account: &'a str,
    payment_method: AdyenCard,
    shopper_interaction: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mpi_data: Option<AdyenMpiData<'a>>,
}

#[derive(Serialize)]
struct AdyenAmount<'a> {
    value: i64,
    currency: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdyenCard {
    #[serde(rename = "type")]
    kind: &'static str,
    number: &'static str,
    expiry_month: &'static str,
    expiry_year: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdyenMpiData<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    cavv: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    eci: Option<&'a str>,
    #[serde(rename = "dsTransID", skip_serializing_if = "Option::is_none")]
    ds_trans_id: Option<&'a str>,
    #[serde(rename = "threeDSVersion", skip_serializing_if = "Option::is_none")]
    three_ds_version: Option<&'a str>,
    authentication_response: &'static str,
    directory_response: &'static str,
}

pub fn adyen_request(
    api_key: &str,
    merchant_account: &str,
    payment: &PaymentDetails<'_>,
) -> Result<DestinationRequest> {
    let body = AdyenPayment {
        amount: AdyenAmount {
            value: payment.amount,
            currency: payment.currency,
        },
        reference: payment.reference,
        merchant_account,
        payment_method: AdyenCard {
            kind: "scheme",
            number: CARD_NUMBER,
            expiry_month: CARD_EXPIRY_MONTH,
            expiry_year: CARD_EXPIRY_YEAR,
        },
        shopper_interaction: "Ecommerce",
        mpi_data: payment.authentication.map(|auth| AdyenMpiData {
            cavv: auth.cryptogram.as_deref(),
            eci: auth.eci.as_deref(),
            ds_trans_id: auth.ds_transaction_id.as_deref(),
            three_ds_version: auth.version.as_deref(),
            authentication_response: "Y",
            directory_response: "Y",
        }),
    };

    Ok(DestinationRequest {
        url: ADYEN_PAYMENTS_URL.into(),
        method: "POST",
        headers: DestinationHeaders::default()
            .with("Content-Type", "application/json")
            .with("x-API-key", api_key),
        body: serde_json::to_string(&body)?,
    })
}

// ============================================================================
// Stripe
// ============================================================================

/// A form field value: encoded literal, or a placeholder kept verbatim
#[derive(Clone, Debug, PartialEq, Eq)]
enum FormValue {
    Literal(String),
    Placeholder(&'static str),
}

/// `application/x-www-form-urlencoded` body that keeps placeholders intact
#[derive(Clone, Debug, Default)]
struct FormBody {
    fields: Vec<(String, FormValue)>,
}

impl FormBody {
    fn literal(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), FormValue::Literal(value.into())));
        self
    }

    fn placeholder(mut self, key: &str, placeholder: &'static str) -> Self {
        self.fields.push((key.to_string(), FormValue::Placeholder(placeholder)));
        self
    }

    fn optional(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.literal(key, value),
            None => self,
        }
    }

    fn encode(&self) -> String {
        let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();

        self.fields
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    FormValue::Literal(v) => encode(v),
                    FormValue::Placeholder(p) => (*p).to_string(),
                };
                format!("{}={value}", encode(key))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

pub fn stripe_request(secret_key: &str, payment: &PaymentDetails<'_>) -> DestinationRequest {
    let mut form = FormBody::default()
        .literal("amount", payment.amount.to_string())
        .literal("currency", payment.currency.to_lowercase())
        .literal("confirm", "true")
        .literal("description", payment.reference)
        .literal("metadata[reference]", payment.reference)
        .literal("payment_method_data[type]", "card")
        .placeholder("payment_method_data[card][number]", CARD_NUMBER)
        .placeholder("payment_method_data[card][exp_month]", CARD_EXPIRY_MONTH)
        .placeholder("payment_method_data[card][exp_year]", CARD_EXPIRY_YEAR);

    if let Some(auth) = payment.authentication {
        let prefix = "payment_method_options[card][three_d_secure]";
        form = form
            .optional(&format!("{prefix}[cryptogram]"), auth.cryptogram.as_deref())
            .optional(
                &format!("{prefix}[electronic_commerce_indicator]"),
                auth.eci.as_deref(),
            )
            .optional(
                &format!("{prefix}[transaction_id]"),
                auth.ds_transaction_id.as_deref(),
            )
            .optional(&format!("{prefix}[version]"), auth.version.as_deref());
    }

    DestinationRequest {
        url: STRIPE_PAYMENT_INTENTS_URL.into(),
        method: "POST",
        headers: DestinationHeaders::default()
            .with("Content-Type", "application/x-www-form-urlencoded")
            .with("Authorization", format!("Bearer {secret_key}")),
        body: form.encode(),
    }
}

// ============================================================================
// Global Payments
// ============================================================================

pub fn global_payments_request(
    access_token: &str,
    payment: &PaymentDetails<'_>,
) -> Result<DestinationRequest> {
    let mut card = json!({
        "number": CARD_NUMBER,
        "expiry_month": CARD_EXPIRY_MONTH,
        "expiry_year": CARD_EXPIRY_YEAR,
    });

    let mut payment_method = json!({
        "entry_mode": "ECOM",
    });

    if let Some(auth) = payment.authentication {
        payment_method["authentication"] = json!({
            "three_ds": {
                "value_result": auth.eci,
                "server_trans_ref": auth.ds_transaction_id,
                "message_version": auth.version,
                "authentication_value": auth.cryptogram,
            }
        });
    } else {
        card["cvv_indicator"] = json!("NOT_PRESENT");
    }
    payment_method["card"] = card;

    let body = json!({
        "account_name": "transaction_processing",
        "channel": "CNP",
        "type": "SALE",
        "capture_mode": "AUTO",
        "amount": payment.amount.to_string(),
        "currency": payment.currency,
        "reference": payment.reference,
        "country": "GB",
        "payment_method": payment_method,
    });

    Ok(DestinationRequest {
        url: GLOBAL_PAYMENTS_TRANSACTIONS_URL.into(),
        method: "POST",
        headers: DestinationHeaders::default()
            .with("Content-Type", "application/json")
            .with("Authorization", format!("Bearer {access_token}"))
            .with("X-GP-Version", GLOBAL_PAYMENTS_API_VERSION),
        body: serde_json::to_string(&body)?,
    })
}
