//! # flow-gateway
//!
//! Outbound side of the Flow demo harness: configuration, bearer-token
//! caching, the payments API client and credential forwarding.
//!
//! ## Request flow
//!
//! ```text
//! browser ──▶ FlowProxy ──▶ CheckoutClient ──▶ payments API
//!                │               │
//!                │               └── CredentialCache (OAuth token)
//!                ├── SessionStore (surcharges)
//!                └── destinations (Adyen / Stripe / Global Payments)
//! ```
//!
//! Every upstream reply is returned as an `UpstreamResponse` carrying the
//! original status and JSON body. Nothing is retried.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flow_gateway::{FlowProxy, GatewayConfig};
//!
//! let proxy = FlowProxy::new(Arc::new(GatewayConfig::from_env()));
//! let response = proxy.create_payment_session(serde_json::json!({"amount": 3000})).await?;
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod destinations;
pub mod forward;
pub mod payloads;
pub mod proxy;

pub use client::{CheckoutClient, UpstreamResponse};
pub use config::{env_opt, normalize_base_url, DestinationSecrets, GatewayConfig};
pub use credentials::{ClientCredentialsFetcher, CredentialCache, TokenFetcher};
pub use destinations::{AuthenticationDetails, Destination, DestinationRequest};
pub use forward::{ForwardRequest, VaultSource};
pub use payloads::{
    AuthenticationSessionRequest, InstrumentRequest, PaymentRequest, SubmitSessionRequest,
    SurchargeRequest,
};
pub use proxy::FlowProxy;
