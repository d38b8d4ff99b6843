//! Hosted payment processor: checkout sessions.
//!
//! Deposits are collected on the processor's hosted checkout page. Gigbook
//! creates a session, redirects the client to its URL, and learns about the
//! payment from a signed webhook (see [`super::webhook`]).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Payment processor errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The processor could not be reached.
    #[error("Payment processor unreachable: {0}")]
    Network(String),

    /// The processor rejected the request.
    #[error("Payment processor error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Processor message.
        message: String,
    },

    /// The response could not be decoded.
    #[error("Unexpected payment processor response: {0}")]
    InvalidResponse(String),
}

/// State of a checkout session at the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStatus {
    /// Waiting for the customer.
    Open,
    /// Paid (or otherwise finished).
    Complete,
    /// Timed out; a new session is needed.
    Expired,
}

/// A checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    /// Processor id, `cs_...`.
    pub id: String,
    /// Hosted page URL; absent once the session is no longer open.
    #[serde(default)]
    pub url: Option<String>,
    /// Session state.
    pub status: CheckoutStatus,
    /// `paid`, `unpaid` or `no_payment_required`.
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Payment reference once paid.
    #[serde(default)]
    pub payment_intent: Option<String>,
}

impl CheckoutSession {
    /// URL to send the customer to, if the session can still be paid.
    #[must_use]
    pub fn open_url(&self) -> Option<&str> {
        match self.status {
            CheckoutStatus::Open => self.url.as_deref(),
            CheckoutStatus::Complete | CheckoutStatus::Expired => None,
        }
    }
}

/// What to charge for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Booking the deposit belongs to; echoed back in webhook metadata.
    pub booking_id: Uuid,
    /// Amount in minor units.
    pub amount_cents: i64,
    /// Lowercase ISO currency.
    pub currency: String,
    /// Line item name.
    pub description: String,
    /// Pre-filled on the checkout page.
    pub customer_email: String,
    /// Return URL after payment.
    pub success_url: String,
    /// Return URL on cancel.
    pub cancel_url: String,
    /// Collapses concurrent creations into one session.
    pub idempotency_key: String,
}

impl CheckoutRequest {
    /// Idempotency key for a deposit checkout.
    ///
    /// Keyed on the session being replaced, so repeated clicks against the
    /// same booking state share one key while a replacement for an expired
    /// session gets a fresh one.
    #[must_use]
    pub fn idempotency_key_for(booking_id: Uuid, previous_session: Option<&str>) -> String {
        format!("deposit-{booking_id}-{}", previous_session.unwrap_or("initial"))
    }
}

/// The checkout API.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Look up a session.
    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError>;
}

/// Stripe settings.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// API base, `https://api.stripe.com`.
    pub api_base: String,
    /// Secret key, sent as a bearer token.
    pub secret_key: String,
    /// HTTP timeout.
    pub timeout: Duration,
}

/// Stripe checkout over its form-encoded REST API.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    config: StripeConfig,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    /// Create a gateway.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Network`] if the HTTP client cannot be built.
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.api_base.trim_end_matches('/'))
    }

    fn form(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("customer_email", request.customer_email.clone()),
            ("client_reference_id", request.booking_id.to_string()),
            ("metadata[booking_id]", request.booking_id.to_string()),
            ("payment_intent_data[metadata][booking_id]", request.booking_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", request.currency.clone()),
            ("line_items[0][price_data][unit_amount]", request.amount_cents.to_string()),
            ("line_items[0][price_data][product_data][name]", request.description.clone()),
        ]
    }

    async fn decode(response: reqwest::Response) -> Result<CheckoutSession, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<CheckoutSession>()
                .await
                .map_err(|e| PaymentError::InvalidResponse(e.to_string()));
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| status.to_string());
        Err(PaymentError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .bearer_auth(&self.config.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&Self::form(request))
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        let session = Self::decode(response).await?;
        tracing::debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .get(self.url(&format!("checkout/sessions/{}", urlencoding::encode(id))))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        Self::decode(response).await
    }
}
