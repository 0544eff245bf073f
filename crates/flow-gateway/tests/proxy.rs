//! Proxy flows against an in-process fake of the payments API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};

use flow_core::FlowError;
use flow_gateway::{FlowProxy, ForwardRequest, GatewayConfig, SubmitSessionRequest};

#[derive(Clone, Default)]
struct Upstream {
    token_hits: Arc<AtomicUsize>,
    session_hits: Arc<AtomicUsize>,
    submit_hits: Arc<AtomicUsize>,
    lookup_hits: Arc<AtomicUsize>,
    forward_hits: Arc<AtomicUsize>,
    gp_token_hits: Arc<AtomicUsize>,
    last_gp_version: Arc<Mutex<Option<String>>>,
    last_authorization: Arc<Mutex<Option<String>>>,
    last_session: Arc<Mutex<Option<Value>>>,
    last_forward: Arc<Mutex<Option<Value>>>,
}

impl Upstream {
    fn total_hits(&self) -> usize {
        [
            &self.token_hits,
            &self.session_hits,
            &self.submit_hits,
            &self.lookup_hits,
            &self.forward_hits,
            &self.gp_token_hits,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

fn hits(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

async fn token(State(up): State<Upstream>) -> Json<Value> {
    up.token_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({"access_token": "oauth-token", "expires_in": 3600, "token_type": "Bearer"}))
}

async fn create_session(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    up.session_hits.fetch_add(1, Ordering::SeqCst);
    *up.last_authorization.lock().unwrap() = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *up.last_session.lock().unwrap() = Some(body.clone());

    if body["amount"].as_i64().unwrap_or(0) <= 0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error_type": "request_invalid", "error_codes": ["amount_invalid"]})),
        );
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "id": "ps_test_1",
            "payment_session_secret": "pss_secret",
            "amount": body["amount"],
        })),
    )
}

async fn submit_session(
    State(up): State<Upstream>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    up.submit_hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::CREATED,
        Json(json!({"id": "pay_1", "status": "Approved", "session": id, "amount": body["amount"]})),
    )
}

async fn authentication_session(
    State(up): State<Upstream>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    up.lookup_hits.fetch_add(1, Ordering::SeqCst);
    if id == "sid_missing" {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": id,
            "status": "approved",
            "cryptogram": "AAABBEg0VhI0VniQEjRWAAAAAAA=",
            "eci": "05",
            "protocol_version": "2.2.0",
            "ds": {"transaction_id": "ds-trans-1"},
        })),
    )
}

async fn forward(State(up): State<Upstream>, Json(body): Json<Value>) -> Json<Value> {
    up.forward_hits.fetch_add(1, Ordering::SeqCst);
    *up.last_forward.lock().unwrap() = Some(body);
    Json(json!({
        "request_id": "fwd_1",
        "destination_response": {"status": 200, "body": "{\"status\":\"succeeded\"}"},
    }))
}

async fn gp_token(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    up.gp_token_hits.fetch_add(1, Ordering::SeqCst);
    *up.last_gp_version.lock().unwrap() = headers
        .get("x-gp-version")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let signed = body["app_id"] == "gp_app"
        && body["grant_type"] == "client_credentials"
        && body["secret"].as_str().is_some_and(|s| s.len() == 128);
    if !signed {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error_code": "INVALID_REQUEST_DATA"})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({"token": "gp-token", "type": "Bearer", "seconds_to_expire": 600})),
    )
}

async fn gp_token_rejected(State(up): State<Upstream>) -> (StatusCode, Json<Value>) {
    up.gp_token_hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error_code": "NOT_AUTHENTICATED"})),
    )
}

async fn spawn_upstream(up: Upstream) -> String {
    let app = Router::new()
        .route("/connect/token", post(token))
        .route("/payment-sessions", post(create_session))
        .route("/payment-sessions/{id}/submit", post(submit_session))
        .route("/sessions/{id}", get(authentication_session))
        .route("/forward", post(forward))
        .route("/gp/accesstoken", post(gp_token))
        .route("/gp/rejected", post(gp_token_rejected))
        .with_state(up);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn config(base: &str) -> GatewayConfig {
    GatewayConfig {
        base_url: base.to_string(),
        token_url: format!("{base}/connect/token"),
        forward_url: format!("{base}/forward"),
        secret_key: Some(SecretString::new("sk_sbox_test".into())),
        processing_channel_id: Some("pc_test".into()),
        ..Default::default()
    }
}

fn global_payments_config(base: &str, token_path: &str) -> GatewayConfig {
    let mut config = config(base);
    config.destinations.global_payments_app_id = Some("gp_app".into());
    config.destinations.global_payments_app_key = Some(SecretString::new("gp_key".into()));
    config.destinations.global_payments_token_url = format!("{base}{token_path}");
    config
}

fn unreferenced_forward(destination: &str) -> ForwardRequest {
    serde_json::from_value(json!({
        "destination": destination,
        "instrumentId": "src_nwd3m4in3hkuddfpjsaevunhdy",
        "amount": 3000,
        "currency": "GBP",
    }))
    .unwrap()
}

fn submit(amount: i64) -> SubmitSessionRequest {
    serde_json::from_value(json!({"session_data": "opaque", "amount": amount})).unwrap()
}

fn forward_request(destination: &str, auth_session_id: Option<&str>) -> ForwardRequest {
    serde_json::from_value(json!({
        "destination": destination,
        "token": "tok_4gzeau5o2uqubbk6fufs3m7p54",
        "instrumentId": null,
        "amount": 3000,
        "currency": "GBP",
        "reference": "forward_1",
        "authSessionId": auth_session_id,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_create_session_relays_and_tracks_amount() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(config(&base)));

    let response = proxy
        .create_payment_session(json!({"amount": 3000, "currency": "GBP"}))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.body["id"], "ps_test_1");
    assert_eq!(proxy.sessions().get("ps_test_1").unwrap().base_amount, 3000);
    assert_eq!(
        up.last_authorization.lock().unwrap().as_deref(),
        Some("Bearer sk_sbox_test")
    );
}

#[tokio::test]
async fn test_rejected_session_is_relayed_and_not_tracked() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(config(&base)));

    let response = proxy.create_payment_session(json!({"amount": -5})).await.unwrap();

    assert_eq!(response.status, 422);
    assert_eq!(response.body["error_type"], "request_invalid");
    assert!(proxy.sessions().is_empty());
}

#[tokio::test]
async fn test_commercial_surcharge_scenario() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(config(&base)));

    proxy
        .create_payment_session(json!({"amount": 3000}))
        .await
        .unwrap();

    let quote = proxy.calculate_surcharge("ps_test_1", "commercial").unwrap();
    assert_eq!(quote.total_amount, 3100);

    let err = proxy
        .submit_payment_session("ps_test_1", submit(3000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::AmountMismatch { expected: 3100, received: 3000 }
    ));
    assert_eq!(hits(&up.submit_hits), 0);

    let response = proxy
        .submit_payment_session("ps_test_1", submit(3100))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.body["amount"], 3100);
    assert_eq!(hits(&up.submit_hits), 1);
    assert!(proxy.sessions().get("ps_test_1").is_none());
}

#[tokio::test]
async fn test_surcharge_for_unknown_session() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(config(&base)));

    let err = proxy.calculate_surcharge("ps_unknown", "consumer").unwrap_err();
    assert!(matches!(err, FlowError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_oauth_token_fetched_once() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let config = GatewayConfig {
        access_key_id: Some("ack_test".into()),
        access_key_secret: Some(SecretString::new("oauth-secret".into())),
        ..config(&base)
    };
    let proxy = FlowProxy::new(Arc::new(config));
    assert!(proxy.oauth_configured());

    proxy.create_payment_session(json!({})).await.unwrap();
    proxy.create_payment_session(json!({})).await.unwrap();

    assert_eq!(hits(&up.token_hits), 1);
    assert_eq!(hits(&up.session_hits), 2);
    assert_eq!(
        up.last_authorization.lock().unwrap().as_deref(),
        Some("Bearer oauth-token")
    );
}

#[tokio::test]
async fn test_missing_credentials_fail_before_upstream() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let config = GatewayConfig {
        secret_key: None,
        ..config(&base)
    };
    let proxy = FlowProxy::new(Arc::new(config));

    let err = proxy.create_payment_session(json!({})).await.unwrap_err();
    assert!(matches!(err, FlowError::Configuration(_)));
    assert_eq!(up.total_hits(), 0);
}

#[tokio::test]
async fn test_forward_to_unconfigured_destination_makes_no_call() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(config(&base)));

    let err = proxy
        .forward_credentials(forward_request("Adyen", Some("sid_ok")))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Configuration(msg) if msg.contains("ADYEN_API_KEY")));
    assert_eq!(up.total_hits(), 0);
}

#[tokio::test]
async fn test_forward_to_unknown_destination() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(config(&base)));

    let err = proxy
        .forward_credentials(forward_request("Worldpay", None))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::UnknownDestination(_)));
    assert_eq!(up.total_hits(), 0);
}

#[tokio::test]
async fn test_forward_to_stripe_with_authentication() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let mut config = config(&base);
    config.destinations.stripe_secret_key = Some(SecretString::new("sk_test_stripe".into()));
    let proxy = FlowProxy::new(Arc::new(config));

    let response = proxy
        .forward_credentials(forward_request("Stripe", Some("sid_ok")))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body["request_id"], "fwd_1");
    assert_eq!(hits(&up.lookup_hits), 1);
    assert_eq!(hits(&up.forward_hits), 1);

    let sent = up.last_forward.lock().unwrap().clone().unwrap();
    assert_eq!(
        sent["source"],
        json!({"type": "token", "token": "tok_4gzeau5o2uqubbk6fufs3m7p54"})
    );
    assert_eq!(sent["reference"], "forward_1");
    assert_eq!(sent["processing_channel_id"], "pc_test");

    let destination = &sent["destination_request"];
    assert_eq!(destination["url"], "https://api.stripe.com/v1/payment_intents");
    assert_eq!(
        destination["headers"]["raw"]["Authorization"],
        "Bearer sk_test_stripe"
    );
    let body = destination["body"].as_str().unwrap();
    assert!(body.contains("={{card_number}}"));
    assert!(body.contains("%5Bcryptogram%5D=AAABBEg0VhI0VniQEjRWAAAAAAA%3D"));
}

#[tokio::test]
async fn test_forward_degrades_when_authentication_lookup_fails() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let mut config = config(&base);
    config.destinations.stripe_secret_key = Some(SecretString::new("sk_test_stripe".into()));
    let proxy = FlowProxy::new(Arc::new(config));

    let response = proxy
        .forward_credentials(forward_request("Stripe", Some("sid_missing")))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(hits(&up.lookup_hits), 1);

    let sent = up.last_forward.lock().unwrap().clone().unwrap();
    let body = sent["destination_request"]["body"].as_str().unwrap();
    assert!(!body.contains("three_d_secure"));
}

#[tokio::test]
async fn test_forward_to_global_payments_reuses_token() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(global_payments_config(&base, "/gp/accesstoken")));

    for _ in 0..2 {
        let response = proxy
            .forward_credentials(unreferenced_forward("Global Payments"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    assert_eq!(hits(&up.gp_token_hits), 1);
    assert_eq!(hits(&up.forward_hits), 2);
    assert_eq!(up.last_gp_version.lock().unwrap().as_deref(), Some("2021-03-22"));

    let sent = up.last_forward.lock().unwrap().clone().unwrap();
    assert_eq!(sent["source"], json!({"type": "id", "id": "src_nwd3m4in3hkuddfpjsaevunhdy"}));
    assert!(sent["reference"].as_str().unwrap().starts_with("forward_"));

    let destination = &sent["destination_request"];
    assert_eq!(destination["url"], "https://apis.sandbox.globalpay.com/ucp/transactions");
    assert_eq!(destination["headers"]["raw"]["Authorization"], "Bearer gp-token");
    assert_eq!(destination["headers"]["raw"]["X-GP-Version"], "2021-03-22");

    let body: Value = serde_json::from_str(destination["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["amount"], "3000");
    assert_eq!(body["payment_method"]["card"]["number"], "{{card_number}}");
}

#[tokio::test]
async fn test_rejected_global_payments_token_stops_forward() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(global_payments_config(&base, "/gp/rejected")));

    let err = proxy
        .forward_credentials(unreferenced_forward("Global Payments"))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::UpstreamAuth { status: 401, .. }));
    assert_eq!(hits(&up.gp_token_hits), 1);
    assert_eq!(hits(&up.forward_hits), 0);
}

#[tokio::test]
async fn test_forward_without_processor_credentials_makes_no_call() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let config = GatewayConfig {
        secret_key: None,
        ..global_payments_config(&base, "/gp/accesstoken")
    };
    let proxy = FlowProxy::new(Arc::new(config));

    let err = proxy
        .forward_credentials(unreferenced_forward("Global Payments"))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Configuration(_)));
    assert_eq!(up.total_hits(), 0);
}

#[tokio::test]
async fn test_bodiless_session_sends_complete_defaults() {
    let up = Upstream::default();
    let base = spawn_upstream(up.clone()).await;
    let proxy = FlowProxy::new(Arc::new(config(&base)));

    let response = proxy.create_payment_session(Value::Null).await.unwrap();

    assert_eq!(response.status, 201);
    let sent = up.last_session.lock().unwrap().clone().unwrap();
    assert_eq!(sent["amount"], 2000);
    assert_eq!(sent["billing"]["address"]["country"], "GB");
    assert_eq!(sent["3ds"]["enabled"], true);
    assert_eq!(sent["risk"]["enabled"], true);
    assert_eq!(sent["processing_channel_id"], "pc_test");
    assert_eq!(proxy.sessions().get("ps_test_1").unwrap().base_amount, 2000);
}
