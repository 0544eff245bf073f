//! HTTP Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use flow_core::{FlowError, SurchargeQuote};
use flow_gateway::{
    AuthenticationSessionRequest, ForwardRequest, InstrumentRequest, PaymentRequest,
    SubmitSessionRequest, SurchargeRequest, UpstreamResponse,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub oauth_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    #[serde(rename = "publicKey")]
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticationDetailsQuery {
    #[serde(rename = "authSessionId")]
    pub auth_session_id: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

/// Log a failure and render it as `{error, code}`
fn api_error(operation: &'static str, err: FlowError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        tracing::error!(operation, error = %err, "Request failed");
    } else {
        tracing::warn!(operation, error = %err, "Request rejected");
    }

    let (expected, received) = match &err {
        FlowError::AmountMismatch { expected, received } => (Some(*expected), Some(*received)),
        _ => (None, None),
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
            expected,
            received,
        }),
    )
}

/// Relay an upstream status and body unchanged
fn relay(response: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(response.body)).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        oauth_configured: state.proxy.oauth_configured(),
    })
}

/// Public key for the browser SDK
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        public_key: state.proxy.config().public_key.clone(),
    })
}

/// Create a payment session; the body is optional
pub async fn create_payment_session(
    State(state): State<AppState>,
    payload: Option<Json<Value>>,
) -> ApiResult<Response> {
    let payload = payload.map_or(Value::Null, |Json(v)| v);

    state
        .proxy
        .create_payment_session(payload)
        .await
        .map(relay)
        .map_err(|e| api_error("create_payment_session", e))
}

/// Compute the surcharge for the card the shopper entered
pub async fn calculate_surcharge(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<SurchargeRequest>,
) -> ApiResult<Json<SurchargeQuote>> {
    let card_category = payload.card_category.unwrap_or_default();

    state
        .proxy
        .calculate_surcharge(&session_id, &card_category)
        .map(Json)
        .map_err(|e| api_error("calculate_surcharge", e))
}

/// Submit a payment session after checking the amount
pub async fn submit_payment_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<SubmitSessionRequest>,
) -> ApiResult<Response> {
    state
        .proxy
        .submit_payment_session(&session_id, payload)
        .await
        .map(relay)
        .map_err(|e| api_error("submit_payment_session", e))
}

/// Vault a card token as an instrument
pub async fn create_instrument(
    State(state): State<AppState>,
    Json(payload): Json<InstrumentRequest>,
) -> ApiResult<Response> {
    state
        .proxy
        .create_instrument(payload)
        .await
        .map(relay)
        .map_err(|e| api_error("create_instrument", e))
}

/// Start a standalone 3-D Secure session
pub async fn create_authentication_session(
    State(state): State<AppState>,
    Json(payload): Json<AuthenticationSessionRequest>,
) -> ApiResult<Response> {
    state
        .proxy
        .create_authentication_session(payload)
        .await
        .map(relay)
        .map_err(|e| api_error("create_authentication_session", e))
}

/// Fetch a 3-D Secure session's outcome
pub async fn get_authentication_details(
    State(state): State<AppState>,
    Query(query): Query<AuthenticationDetailsQuery>,
) -> ApiResult<Response> {
    let auth_session_id = query.auth_session_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        api_error(
            "get_authentication_details",
            FlowError::InvalidRequest("authSessionId is required".into()),
        )
    })?;

    state
        .proxy
        .get_authentication_details(&auth_session_id)
        .await
        .map(relay)
        .map_err(|e| api_error("get_authentication_details", e))
}

/// Pay with a card token
pub async fn create_payment(
    State(state): State<AppState>,
    Json(payload): Json<PaymentRequest>,
) -> ApiResult<Response> {
    state
        .proxy
        .create_payment(payload)
        .await
        .map(relay)
        .map_err(|e| api_error("create_payment", e))
}

/// Forward a vaulted credential to a third-party acquirer
pub async fn forward_credentials(
    State(state): State<AppState>,
    Json(payload): Json<ForwardRequest>,
) -> ApiResult<Response> {
    state
        .proxy
        .forward_credentials(payload)
        .await
        .map(relay)
        .map_err(|e| api_error("forward_credentials", e))
}
