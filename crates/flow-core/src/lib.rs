//! # flow-core
//!
//! Process-local state and error types for the Flow demo harness.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      flow-server (axum)                      │
//! │  ┌─────────────┐  ┌─────────────────┐  ┌─────────────────┐  │
//! │  │  Handlers   │──│  flow-gateway   │──│  Upstream API   │  │
//! │  │             │  │  (proxy/tokens) │  │  (payments)     │  │
//! │  └─────────────┘  └─────────────────┘  └─────────────────┘  │
//! │                    ┌─────────────────┐                       │
//! │                    │   flow-core     │                       │
//! │                    │ sessions/tokens │                       │
//! │                    └─────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate performs I/O. State is held in memory only and is
//! lost when the process exits.

pub mod error;
pub mod session;
pub mod token;

pub use error::{FlowError, Result};
pub use session::{SessionStore, SessionSurcharge, SurchargeQuote, COMMERCIAL_SURCHARGE};
pub use token::{CachedToken, TokenGrant, DEFAULT_EXPIRES_IN_SECS, EXPIRY_MARGIN_SECS};
