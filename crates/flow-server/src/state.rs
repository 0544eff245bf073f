//! Application State

use std::sync::Arc;

use flow_gateway::FlowProxy;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payments API proxy, owning the token cache and session store
    pub proxy: Arc<FlowProxy>,
}

impl AppState {
    pub fn new(proxy: FlowProxy) -> Self {
        Self {
            proxy: Arc::new(proxy),
        }
    }
}
