//! Payment processor webhook.
//!
//! Answers 400 when a delivery cannot be trusted or parsed, 200 once the
//! event is handled or deliberately ignored, and 500 when recording the
//! payment failed so the processor retries.

use crate::aggregates::booking::{BookingAction, BookingReducer, BookingState};
use crate::aggregates::execute;
use crate::providers::webhook::{
    verify_signature, DepositPayment, WebhookError, WebhookEvent, SIGNATURE_HEADER,
};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use gigbook_postgres::Actor;
use gigbook_web::{ClientIp, CorrelationId};
use uuid::Uuid;

type Reply = (StatusCode, &'static str);

const OK: Reply = (StatusCode::OK, "ok");
const RETRY: Reply = (StatusCode::INTERNAL_SERVER_ERROR, "retry");

/// `POST /webhooks/payments`
pub async fn payments(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!(error = %WebhookError::MissingSignature, %client_ip, "Webhook rejected");
        return (StatusCode::BAD_REQUEST, "missing signature");
    };

    let now = state.services.clock.now().timestamp();
    if let Err(error) = verify_signature(
        &body,
        signature,
        &state.settings.webhook_secret,
        now,
        state.settings.webhook_tolerance,
    ) {
        tracing::warn!(%error, %client_ip, "Webhook signature rejected");
        metrics::counter!("webhook.rejected").increment(1);
        return (StatusCode::BAD_REQUEST, "invalid signature");
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "Webhook payload unreadable");
            return (StatusCode::BAD_REQUEST, "invalid payload");
        },
    };

    let Some(payment) = event.deposit_payment() else {
        tracing::debug!(event_id = %event.id, kind = %event.kind, %correlation_id, "Webhook ignored");
        return OK;
    };

    record_deposit(&state, payment, correlation_id).await
}

#[tracing::instrument(
    skip_all,
    fields(%correlation_id, booking_id = %payment.booking_id, session_id = %payment.session_id)
)]
async fn record_deposit(state: &AppState, payment: DepositPayment, correlation_id: Uuid) -> Reply {
    let booking = match state.services.bookings.find(&Actor::Service, payment.booking_id).await {
        Ok(Some(booking)) => booking,
        Ok(None) => {
            tracing::warn!("Deposit paid for an unknown booking");
            return OK;
        },
        Err(error) => {
            tracing::error!(%error, "Could not load booking for deposit");
            return RETRY;
        },
    };
    let profile = match state.services.profiles.find_by_id(&Actor::Service, booking.profile_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            tracing::error!(profile_id = %booking.profile_id, "Booking without a profile");
            return RETRY;
        },
        Err(error) => {
            tracing::error!(%error, "Could not load profile for deposit");
            return RETRY;
        },
    };

    let command = BookingAction::DepositPaid {
        session_id: payment.session_id,
        payment_intent_id: payment.payment_intent_id,
    };
    let outcome = execute(
        BookingReducer::new(),
        BookingState::existing(profile, booking),
        state.booking_env(),
        command,
    )
    .await;

    match outcome {
        Ok(BookingAction::DepositRecorded { .. } | BookingAction::DepositAlreadyRecorded { .. }) => OK,
        Ok(BookingAction::Rejected { reason }) => {
            tracing::warn!(%reason, "Deposit event not applied");
            OK
        },
        Ok(BookingAction::Failed { error }) => {
            tracing::error!(%error, "Recording deposit failed");
            RETRY
        },
        Ok(other) => {
            tracing::error!(outcome = ?other, "Unexpected deposit outcome");
            RETRY
        },
        Err(error) => {
            tracing::error!(%error, "Deposit command did not finish");
            RETRY
        },
    }
}
