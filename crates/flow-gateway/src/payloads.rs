//! Outbound Payloads
//!
//! Inbound request bodies accepted from the browser and the upstream
//! bodies built from them. Any field the caller leaves out is filled with a
//! fixed default.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use flow_core::{FlowError, Result};

use crate::config::GatewayConfig;

pub const DEFAULT_AMOUNT: i64 = 2000;
pub const DEFAULT_CURRENCY: &str = "GBP";

/// Eight random lowercase hex digits
fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Order-style reference such as `ORD-1A2B3C4D`
pub fn generate_reference(prefix: &str) -> String {
    format!("{prefix}-{}", short_id().to_uppercase())
}

/// Default forward reference such as `forward_1a2b3c4d`
pub fn forward_reference() -> String {
    format!("forward_{}", short_id())
}

/// Fill top-level fields missing from `payload` with those from `defaults`
///
/// A field the caller sent as `null` counts as missing. A payload that is
/// not a JSON object is replaced by the defaults.
pub fn merge_defaults(payload: Value, defaults: Value) -> Value {
    let mut merged = match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    if let Value::Object(defaults) = defaults {
        for (key, value) in defaults {
            match merged.get(&key) {
                Some(existing) if !existing.is_null() => {}
                _ => {
                    merged.insert(key, value);
                }
            }
        }
    }

    Value::Object(merged)
}

/// Reject ids that could escape their URL path segment
pub fn validate_path_id(id: &str) -> Result<&str> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(id)
    } else {
        Err(FlowError::InvalidRequest(format!("Invalid identifier: {id}")))
    }
}

// ============================================================================
// Payment sessions
// ============================================================================

/// Build the payment-session body from whatever the browser sent
///
/// Pages that POST without a body get a complete demo session: sandbox
/// billing details, 3DS and risk screening enabled, and every wallet the
/// demo pages mount. Authorization only; capture is left to the caller.
pub fn payment_session_payload(payload: Value, config: &GatewayConfig) -> Value {
    let mut payment_method_configuration = json!({
        "applepay": {"store_payment_details": "enabled"},
        "card": {"store_payment_details": "collect_consent"},
        "googlepay": {"store_payment_details": "enabled"},
    });
    if let Some(customer_id) = &config.customer_id {
        payment_method_configuration["stored_card"] = json!({ "customer_id": customer_id });
    }

    let defaults = json!({
        "amount": DEFAULT_AMOUNT,
        "currency": DEFAULT_CURRENCY,
        "reference": generate_reference("ORD"),
        "display_name": "Online Shop",
        "payment_type": "Regular",
        "description": "Payment",
        "capture": false,
        "processing_channel_id": config.processing_channel_id,
        "payment_method_configuration": payment_method_configuration,
        "enabled_payment_methods": ["card", "stored_card", "applepay", "googlepay", "paypal"],
        "billing_descriptor": {"name": "Online Shop", "city": "London"},
        "billing": {
            "address": {
                "address_line1": "123 High St.",
                "address_line2": "Flat 456",
                "city": "London",
                "zip": "SW1A 1AA",
                "country": "GB",
            },
            "phone": {"country_code": "+44", "number": "1234567890"},
        },
        "risk": {"enabled": true},
        "3ds": {"enabled": true},
        "success_url": config.origin_url("?status=succeeded"),
        "failure_url": config.origin_url("?status=failed"),
        "metadata": {},
    });

    let mut merged = merge_defaults(payload, defaults);

    if let Some(customer_id) = &config.customer_id {
        attach_customer_id(&mut merged, customer_id);
    }

    if merged.get("processing_channel_id").is_some_and(Value::is_null) {
        if let Value::Object(map) = &mut merged {
            map.remove("processing_channel_id");
        }
    }

    merged
}

fn attach_customer_id(payload: &mut Value, customer_id: &str) {
    let Value::Object(map) = payload else {
        return;
    };

    let customer = map
        .entry("customer")
        .or_insert_with(|| Value::Object(Map::new()));

    if customer.is_null() {
        *customer = Value::Object(Map::new());
    }

    if let Value::Object(customer) = customer {
        customer
            .entry("id")
            .or_insert_with(|| Value::String(customer_id.to_string()));
    }
}

/// Amount the upstream session was created for
pub fn session_amount(payload: &Value) -> Option<i64> {
    payload.get("amount").and_then(Value::as_i64)
}

/// Submission of a payment session
#[derive(Clone, Debug, Deserialize)]
pub struct SubmitSessionRequest {
    /// Amount the browser is about to charge
    #[serde(default)]
    pub amount: Option<i64>,

    /// Remaining fields (`session_data`, ...) passed through unchanged
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl SubmitSessionRequest {
    pub fn required_amount(&self) -> Result<i64> {
        self.amount
            .ok_or_else(|| FlowError::InvalidRequest("amount is required".into()))
    }

    pub fn into_upstream(self, amount: i64) -> Value {
        let mut body = self.rest;
        body.insert("amount".into(), Value::from(amount));
        Value::Object(body)
    }
}

/// Surcharge calculation input
#[derive(Clone, Debug, Deserialize)]
pub struct SurchargeRequest {
    #[serde(default)]
    pub card_category: Option<String>,
}

// ============================================================================
// Instruments
// ============================================================================

/// Browser request to vault a token as an instrument
#[derive(Clone, Debug, Deserialize)]
pub struct InstrumentRequest {
    pub token: String,
    #[serde(default)]
    pub billing_address: Option<Value>,
    #[serde(default)]
    pub customer: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct UpstreamInstrument {
    #[serde(rename = "type")]
    kind: &'static str,
    token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_holder: Option<AccountHolder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer: Option<Value>,
}

#[derive(Debug, Serialize)]
struct AccountHolder {
    billing_address: Value,
}

impl InstrumentRequest {
    pub fn into_upstream(self, config: &GatewayConfig) -> UpstreamInstrument {
        let customer = self.customer.filter(|c| !c.is_null()).or_else(|| {
            config
                .customer_id
                .as_ref()
                .map(|id| json!({ "id": id }))
        });

        UpstreamInstrument {
            kind: "token",
            token: self.token,
            account_holder: self
                .billing_address
                .filter(|a| !a.is_null())
                .map(|billing_address| AccountHolder { billing_address }),
            customer,
        }
    }
}

// ============================================================================
// 3-D Secure authentication sessions
// ============================================================================

/// Browser request to start a standalone 3DS session
#[derive(Clone, Debug, Deserialize)]
pub struct AuthenticationSessionRequest {
    pub token: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub billing_address: Option<Value>,
    #[serde(default)]
    pub mobile_phone: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<Value>,
    #[serde(default)]
    pub completion: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SessionSource {
    #[serde(rename = "type")]
    kind: &'static str,
    token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_address: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile_phone: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct UpstreamAuthenticationSession {
    source: SessionSource,
    amount: i64,
    currency: String,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_channel_id: Option<String>,
    authentication_type: &'static str,
    authentication_category: &'static str,
    challenge_indicator: &'static str,
    transaction_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipping_address: Option<Value>,
    completion: Value,
}

impl AuthenticationSessionRequest {
    pub fn into_upstream(self, config: &GatewayConfig) -> UpstreamAuthenticationSession {
        let completion = self.completion.filter(|c| !c.is_null()).unwrap_or_else(|| {
            json!({
                "type": "hosted",
                "success_url": config.origin_url("?authentication-status=succeeded"),
                "failure_url": config.origin_url("?authentication-status=failed"),
            })
        });

        UpstreamAuthenticationSession {
            source: SessionSource {
                kind: "token",
                token: self.token,
                billing_address: self.billing_address,
                email: self.email,
                mobile_phone: self.mobile_phone,
            },
            amount: self.amount.unwrap_or(DEFAULT_AMOUNT),
            currency: self.currency.unwrap_or_else(|| DEFAULT_CURRENCY.into()),
            reference: self.reference.unwrap_or_else(|| generate_reference("AUTH")),
            processing_channel_id: config.processing_channel_id.clone(),
            authentication_type: "regular",
            authentication_category: "payment",
            challenge_indicator: "no_preference",
            transaction_type: "goods_service",
            shipping_address: self.shipping_address,
            completion,
        }
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Browser request to pay with a token, optionally after 3DS
#[derive(Clone, Debug, Deserialize)]
pub struct PaymentRequest {
    pub token: String,
    #[serde(default)]
    pub authentication_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capture: Option<bool>,
    #[serde(default)]
    pub billing: Option<Value>,
    #[serde(default)]
    pub customer: Option<Value>,
    #[serde(default)]
    pub shipping: Option<Value>,
    #[serde(default)]
    pub billing_descriptor: Option<Value>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub failure_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct PaymentSource {
    #[serde(rename = "type")]
    kind: &'static str,
    token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_address: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ThreeDs {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpstreamPayment {
    source: PaymentSource,
    amount: i64,
    currency: String,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    capture: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipping: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_descriptor: Option<Value>,
    #[serde(rename = "3ds")]
    three_ds: ThreeDs,
    success_url: String,
    failure_url: String,
}

impl PaymentRequest {
    pub fn into_upstream(self, config: &GatewayConfig) -> UpstreamPayment {
        let billing = self.billing.unwrap_or(Value::Null);
        let billing_address = billing.get("address").filter(|a| !a.is_null()).cloned();
        let phone = billing.get("phone").filter(|p| !p.is_null()).cloned();

        UpstreamPayment {
            source: PaymentSource {
                kind: "token",
                token: self.token,
                billing_address,
                phone,
            },
            amount: self.amount.unwrap_or(DEFAULT_AMOUNT),
            currency: self.currency.unwrap_or_else(|| DEFAULT_CURRENCY.into()),
            reference: self.reference.unwrap_or_else(|| generate_reference("ORD")),
            description: self.description,
            capture: self.capture.unwrap_or(true),
            processing_channel_id: config.processing_channel_id.clone(),
            customer: self.customer,
            shipping: self.shipping,
            billing_descriptor: self.billing_descriptor,
            three_ds: ThreeDs {
                enabled: true,
                authentication_id: self.authentication_id,
            },
            success_url: self
                .success_url
                .unwrap_or_else(|| config.origin_url("?status=succeeded")),
            failure_url: self
                .failure_url
                .unwrap_or_else(|| config.origin_url("?status=failed")),
        }
    }
}
