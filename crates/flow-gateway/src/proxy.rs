//! Request Proxy
//!
//! One method per browser-facing operation. Each fills defaults, calls the
//! payments API and hands back the upstream status and body unchanged. The
//! session store is consulted only by the surcharge and submit flows.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use flow_core::{FlowError, Result, SessionStore, SurchargeQuote};

use crate::client::{CheckoutClient, UpstreamResponse};
use crate::config::GatewayConfig;
use crate::credentials::{CredentialCache, GlobalPaymentsTokenFetcher};
use crate::destinations::{
    adyen_request, global_payments_request, stripe_request, AuthenticationDetails, Destination,
    DestinationCredentials, DestinationRequest, PaymentDetails,
};
use crate::forward::{ForwardEnvelope, ForwardRequest, VaultSource};
use crate::payloads::{
    forward_reference, payment_session_payload, session_amount, validate_path_id,
    AuthenticationSessionRequest, InstrumentRequest, PaymentRequest, SubmitSessionRequest,
};

/// Browser-facing proxy over the payments API
pub struct FlowProxy {
    client: CheckoutClient,
    sessions: Arc<SessionStore>,
    global_payments_tokens: CredentialCache,
}

impl FlowProxy {
    /// Build the proxy and its token caches from configuration
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        let client = CheckoutClient::new(config);

        let secrets = &client.config().destinations;
        let global_payments_tokens = match (
            &secrets.global_payments_app_id,
            &secrets.global_payments_app_key,
        ) {
            (Some(app_id), Some(app_key)) => {
                CredentialCache::new(Arc::new(
                    GlobalPaymentsTokenFetcher::new(
                        client.http().clone(),
                        app_id.clone(),
                        SecretString::new(app_key.expose_secret().clone()),
                    )
                    .with_token_url(secrets.global_payments_token_url.clone()),
                ))
            }
            _ => CredentialCache::disabled(),
        };

        Self::from_parts(client, Arc::new(SessionStore::new()), global_payments_tokens)
    }

    pub fn from_parts(
        client: CheckoutClient,
        sessions: Arc<SessionStore>,
        global_payments_tokens: CredentialCache,
    ) -> Self {
        Self {
            client,
            sessions,
            global_payments_tokens,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        self.client.config()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn oauth_configured(&self) -> bool {
        self.client.oauth_configured()
    }

    /// Create a payment session and remember its amount
    pub async fn create_payment_session(&self, payload: Value) -> Result<UpstreamResponse> {
        let body = payment_session_payload(payload, self.config());
        let response = self.client.post("/payment-sessions", &body).await?;

        if response.is_success() {
            match (response.id(), session_amount(&body)) {
                (Some(id), Some(amount)) => self.sessions.put(id, amount),
                _ => tracing::warn!("Payment session created without an id or amount; not tracked"),
            }
        }

        Ok(response)
    }

    pub fn calculate_surcharge(&self, session_id: &str, card_category: &str) -> Result<SurchargeQuote> {
        self.sessions.calculate_surcharge(session_id, card_category)
    }

    /// Validate the amount, submit upstream, and forget the session on success
    pub async fn submit_payment_session(
        &self,
        session_id: &str,
        request: SubmitSessionRequest,
    ) -> Result<UpstreamResponse> {
        let session_id = validate_path_id(session_id)?;
        let amount = request.required_amount()?;
        self.sessions.validate_amount(session_id, amount)?;

        let path = format!("/payment-sessions/{session_id}/submit");
        let response = self.client.post(&path, &request.into_upstream(amount)).await?;

        if matches!(response.status, 201 | 202) {
            self.sessions.remove(session_id);
            tracing::info!(session_id, amount, status = response.status, "Payment session submitted");
        }

        Ok(response)
    }

    pub async fn create_instrument(&self, request: InstrumentRequest) -> Result<UpstreamResponse> {
        let body = request.into_upstream(self.config());
        self.client.post("/instruments", &body).await
    }

    pub async fn create_authentication_session(
        &self,
        request: AuthenticationSessionRequest,
    ) -> Result<UpstreamResponse> {
        let body = request.into_upstream(self.config());
        self.client.post("/sessions", &body).await
    }

    pub async fn get_authentication_details(&self, auth_session_id: &str) -> Result<UpstreamResponse> {
        let auth_session_id = validate_path_id(auth_session_id)?;
        self.client.get(&format!("/sessions/{auth_session_id}")).await
    }

    pub async fn create_payment(&self, request: PaymentRequest) -> Result<UpstreamResponse> {
        let body = request.into_upstream(self.config());
        self.client.post("/payments", &body).await
    }

    /// Forward a vaulted credential to a third-party destination
    ///
    /// Destination name, destination secrets, the credential itself and the
    /// processor's own API credentials are all checked before any call to a
    /// destination's token endpoint or the forward API.
    pub async fn forward_credentials(&self, request: ForwardRequest) -> Result<UpstreamResponse> {
        let destination: Destination = request.destination.parse()?;
        let credentials = destination.credentials(&self.config().destinations)?;
        let source = VaultSource::resolve(request.token.as_deref(), request.instrument_id.as_deref())?;
        self.client.bearer().await?;

        let authentication = self
            .resolve_authentication(request.auth_details.as_ref(), request.auth_session_id.as_deref())
            .await;

        let reference = request
            .reference
            .clone()
            .unwrap_or_else(forward_reference);

        let payment = PaymentDetails {
            amount: request.amount,
            currency: &request.currency,
            reference: &reference,
            authentication: authentication.as_ref(),
        };

        let destination_request = self.destination_request(credentials, &payment).await?;

        tracing::info!(
            destination = %destination,
            source = source.kind(),
            reference = %reference,
            authenticated = authentication.is_some(),
            "Forwarding credentials"
        );

        let envelope = ForwardEnvelope {
            source,
            reference,
            processing_channel_id: self.config().processing_channel_id.clone(),
            destination_request,
        };

        let forward_url = self.config().forward_url.clone();
        self.client.post_url(&forward_url, &envelope).await
    }

    async fn destination_request(
        &self,
        credentials: DestinationCredentials<'_>,
        payment: &PaymentDetails<'_>,
    ) -> Result<DestinationRequest> {
        match credentials {
            DestinationCredentials::Adyen {
                api_key,
                merchant_account,
            } => adyen_request(api_key, merchant_account, payment),
            DestinationCredentials::Stripe { secret_key } => Ok(stripe_request(secret_key, payment)),
            DestinationCredentials::GlobalPayments => {
                let token = self
                    .global_payments_tokens
                    .get_access_token()
                    .await?
                    .ok_or_else(|| {
                        FlowError::Configuration("Global Payments credentials are not configured".into())
                    })?;
                global_payments_request(&token, payment)
            }
        }
    }

    /// 3DS proof for a forward, if any can be found
    ///
    /// A failed lookup is logged and treated as "no authentication".
    async fn resolve_authentication(
        &self,
        auth_details: Option<&Value>,
        auth_session_id: Option<&str>,
    ) -> Option<AuthenticationDetails> {
        if let Some(details) = auth_details.and_then(AuthenticationDetails::from_session) {
            return Some(details);
        }

        let auth_session_id = auth_session_id.filter(|id| !id.is_empty())?;

        match self.get_authentication_details(auth_session_id).await {
            Ok(response) if response.is_success() => {
                AuthenticationDetails::from_session(&response.body)
            }
            Ok(response) => {
                tracing::warn!(
                    auth_session_id,
                    status = response.status,
                    "Authentication details unavailable, forwarding without them"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    auth_session_id,
                    error = %e,
                    "Authentication lookup failed, forwarding without it"
                );
                None
            }
        }
    }
}
