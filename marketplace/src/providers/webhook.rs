//! Signed payment webhooks.
//!
//! The processor signs each delivery with the endpoint secret:
//!
//! ```text
//! Stripe-Signature: t=1700000000,v1=5257a869e7ec...
//! v1 = hex(HMAC-SHA256(secret, "{t}.{raw body}"))
//! ```
//!
//! A delivery is accepted when any `v1` entry matches and `t` is within the
//! tolerance of the current time.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Maximum age of a delivery, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Webhook rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// No signature header.
    #[error("Missing signature header")]
    MissingSignature,

    /// Header lacks `t=` or `v1=`.
    #[error("Malformed signature header")]
    MalformedHeader,

    /// Timestamp outside the tolerance window.
    #[error("Signature timestamp outside tolerance")]
    StaleTimestamp,

    /// No `v1` entry matches.
    #[error("Signature mismatch")]
    SignatureMismatch,

    /// Body is not a webhook event.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

fn signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SignatureMismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify a webhook delivery.
///
/// `now` is the current unix time in seconds.
///
/// # Errors
///
/// Returns the first reason the delivery cannot be trusted.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| WebhookError::MalformedHeader)?);
            },
            Some(("v1", value)) => candidates.push(value),
            _ => {},
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(WebhookError::StaleTimestamp);
    }

    let expected = signature(secret, timestamp, payload)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|given| constant_time_eq::constant_time_eq(&given, &expected))
    });
    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Build a signature header for `payload`. Used to sign test deliveries.
#[must_use]
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let digest = signature(secret, timestamp, payload).unwrap_or_default();
    format!("t={timestamp},v1={}", hex::encode(digest))
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event id, `evt_...`.
    pub id: String,
    /// Event type, e.g. `checkout.session.completed`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    pub data: WebhookData,
}

/// `data` of a webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    /// The object the event is about.
    pub object: CheckoutObject,
}

/// Fields of a checkout session object Gigbook reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutObject {
    /// Session id.
    #[serde(default)]
    pub id: String,
    /// `paid` once money moved.
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Payment reference.
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Metadata set at creation.
    #[serde(default)]
    pub metadata: CheckoutMetadata,
}

/// Metadata Gigbook attaches to checkout sessions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutMetadata {
    /// Booking the deposit is for.
    #[serde(default)]
    pub booking_id: Option<String>,
}

/// A completed and paid deposit checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPayment {
    /// Booking the payment is for.
    pub booking_id: Uuid,
    /// Checkout session id.
    pub session_id: String,
    /// Payment reference.
    pub payment_intent_id: Option<String>,
}

impl WebhookEvent {
    /// Parse a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidPayload`] if the body is not an event.
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    /// The deposit payment this event reports, if any.
    ///
    /// Only `checkout.session.completed` with `payment_status == "paid"` and a
    /// parseable `metadata.booking_id` qualifies; everything else is ignored.
    #[must_use]
    pub fn deposit_payment(&self) -> Option<DepositPayment> {
        if self.kind != "checkout.session.completed" {
            return None;
        }
        let object = &self.data.object;
        if object.payment_status.as_deref() != Some("paid") {
            return None;
        }
        let booking_id = object.metadata.booking_id.as_deref()?.parse().ok()?;
        Some(DepositPayment {
            booking_id,
            session_id: object.id.clone(),
            payment_intent_id: object.payment_intent.clone(),
        })
    }
}
