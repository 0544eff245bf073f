//! Flow demo harness HTTP server
//!
//! Axum-based server that proxies browser requests to the payments API and
//! serves the static demo pages.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flow_gateway::{env_opt, FlowProxy, GatewayConfig};

use crate::handlers::{
    calculate_surcharge, create_authentication_session, create_instrument, create_payment,
    create_payment_session, forward_credentials, get_authentication_details, get_config,
    health_check, submit_payment_session,
};
use crate::state::AppState;

/// Build the router; unmatched paths fall through to the static directory
fn app(state: AppState, static_dir: &str) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & config
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        // Payment sessions
        .route("/create-payment-session", post(create_payment_session))
        .route("/create-payment-sessions", post(create_payment_session))
        .route("/calculate-surcharge/{id}", post(calculate_surcharge))
        .route("/submit-payment-session/{id}", post(submit_payment_session))
        // Tokenize-only flows
        .route("/create-instrument", post(create_instrument))
        .route("/create-authentication-session", post(create_authentication_session))
        .route("/get-authentication-details", get(get_authentication_details))
        .route("/create-payment", post(create_payment))
        .route("/forward-credentials", post(forward_credentials))
        // Static demo pages
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env_opt("RUST_LOG").unwrap_or_else(|| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env();

    if config.oauth_configured() {
        tracing::info!("✓ OAuth client credentials configured");
    } else if config.secret_key.is_some() {
        tracing::info!("✓ Using static secret key");
    } else {
        tracing::warn!("⚠ No API credentials configured - upstream calls will fail");
        tracing::warn!("  Set ACCESS_KEY_ID and ACCESS_KEY_SECRET, or SECRET_KEY in .env");
    }
    if config.public_key.is_none() {
        tracing::warn!("⚠ PUBLIC_KEY not set - browser components cannot mount");
    }
    tracing::info!(base_url = %config.base_url, "Payments API");

    let state = AppState::new(FlowProxy::new(Arc::new(config)));

    let static_dir = env_opt("STATIC_DIR").unwrap_or_else(|| "public".into());
    let app = app(state, &static_dir);

    // Start server
    let addr = env_opt("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 flow-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                         - Health check");
    tracing::info!("  GET  /config                         - Public key");
    tracing::info!("  POST /create-payment-session         - Create payment session");
    tracing::info!("  POST /calculate-surcharge/:id        - Card surcharge");
    tracing::info!("  POST /submit-payment-session/:id     - Submit payment session");
    tracing::info!("  POST /create-instrument              - Vault a token");
    tracing::info!("  POST /create-authentication-session  - Start 3DS");
    tracing::info!("  GET  /get-authentication-details     - 3DS outcome");
    tracing::info!("  POST /create-payment                 - Pay with a token");
    tracing::info!("  POST /forward-credentials            - Forward to an acquirer");
    tracing::info!("  Static files from ./{}", static_dir);
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
