//! Booking submission and the client's side of a request.
//!
//! Clients have no account. The status link carries a random token that the
//! `client_booking` RPC checks; everything after submission is reachable
//! only with it.

use super::{actor_for, money, not_found, render, Chrome};
use crate::aggregates::booking::{BookingAction, BookingReducer, BookingState};
use crate::aggregates::execute;
use crate::server::AppState;
use crate::types::{BookingRequest, BookingStatus, Profile};
use crate::validation::BookingInput;
use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{Html, Redirect};
use axum::Form;
use gigbook_auth::MaybeUser;
use gigbook_postgres::Actor;
use gigbook_web::{flash, AppError, Flash, WebResult};
use serde::Deserialize;
use uuid::Uuid;

/// Query of every client page.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    /// Client token from the status link.
    #[serde(default)]
    pub token: String,
    /// Flash notice.
    #[serde(default)]
    pub message: Option<String>,
    /// Flash error.
    #[serde(default)]
    pub error: Option<String>,
}

impl TokenQuery {
    fn flash(&self) -> Flash {
        Flash {
            message: self.message.clone(),
            error: self.error.clone(),
        }
    }
}

/// Deposit checkout form.
#[derive(Debug, Deserialize)]
pub struct DepositForm {
    /// Client token.
    #[serde(default)]
    pub token: String,
}

/// A request as the client sees it.
#[derive(Debug, Clone)]
pub struct ClientView {
    /// Status page path, token included.
    pub status_path: String,
    /// Deposit form action.
    pub deposit_path: String,
    /// DJ stage name.
    pub dj_name: String,
    /// DJ profile path.
    pub dj_path: String,
    /// Status label.
    pub status: &'static str,
    /// Status class for styling.
    pub status_class: &'static str,
    /// Event date.
    pub event_date: String,
    /// Event type.
    pub event_type: String,
    /// Venue.
    pub venue: String,
    /// Formatted deposit, once set.
    pub deposit: Option<String>,
    /// Deposit received.
    pub deposit_paid: bool,
    /// The client can pay now.
    pub can_pay: bool,
    /// The DJ's note on a declined request.
    pub decline_reason: Option<String>,
}

impl ClientView {
    fn new(booking: &BookingRequest, profile: &Profile, currency: &str) -> Self {
        let deposit = booking.deposit_cents.filter(|c| *c > 0);
        Self {
            status_path: booking.status_path(),
            deposit_path: format!("/requests/{}/deposit", booking.id),
            dj_name: profile.display_name.clone(),
            dj_path: format!("/dj/{}", profile.slug),
            status: booking.status.label(),
            status_class: booking.status.as_str(),
            event_date: booking.event_date.format("%A %-d %B %Y").to_string(),
            event_type: booking.event_type.clone(),
            venue: booking.venue.clone(),
            deposit: deposit.map(|cents| money(cents, currency)),
            deposit_paid: booking.deposit_paid,
            can_pay: booking.status == BookingStatus::Accepted
                && !booking.deposit_paid
                && deposit.is_some(),
            decline_reason: booking.decline_reason.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "request_status.html")]
struct StatusPage {
    chrome: Chrome,
    request: ClientView,
    token: String,
}

#[derive(Template)]
#[template(path = "deposit_return.html")]
struct DepositReturnPage {
    chrome: Chrome,
    request: ClientView,
    completed: bool,
}

/// Load a request by client token, and its DJ.
async fn load_for_client(state: &AppState, id: Uuid, token: &str) -> WebResult<(BookingRequest, Profile)> {
    if token.is_empty() {
        return Err(not_found());
    }
    let booking = state
        .services
        .bookings
        .find_for_client(&Actor::Anonymous, id, token)
        .await?
        .ok_or_else(not_found)?;
    // The token already authorized this lookup; drafts stay readable here.
    let profile = state
        .services
        .profiles
        .find_by_id(&Actor::Service, booking.profile_id)
        .await?
        .ok_or_else(not_found)?;
    Ok((booking, profile))
}

/// `POST /dj/:slug/book`
pub async fn submit(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
    Form(input): Form<BookingInput>,
) -> WebResult<Redirect> {
    let profile = state
        .services
        .profiles
        .find_by_slug(&Actor::Anonymous, &slug.to_ascii_lowercase())
        .await?
        .ok_or_else(not_found)?;
    let back = format!("/dj/{}", profile.slug);

    let actor = user.as_ref().map_or(Actor::Anonymous, actor_for);
    let outcome = execute(
        BookingReducer::new(),
        BookingState::for_profile(profile),
        state.booking_env(),
        BookingAction::Submit { actor, input },
    )
    .await?;

    match outcome {
        BookingAction::Submitted { booking } => Ok(flash::message(
            &booking.status_path(),
            "Request sent! We've emailed you a link to this page.",
        )),
        BookingAction::Rejected { reason } => Ok(flash::error(&back, &reason)),
        other => Err(command_failed(other)),
    }
}

/// `GET /requests/:id?token=`
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> WebResult<Html<String>> {
    let (booking, profile) = load_for_client(&state, id, &query.token).await?;
    render(&StatusPage {
        chrome: Chrome::new(None, query.flash()),
        request: ClientView::new(&booking, &profile, &state.settings.deposit.currency),
        token: query.token,
    })
}

/// `POST /requests/:id/deposit`
///
/// Sends the client to the hosted checkout page.
pub async fn start_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<DepositForm>,
) -> WebResult<Redirect> {
    let (booking, profile) = load_for_client(&state, id, &form.token).await?;
    let back = booking.status_path();

    let outcome = execute(
        BookingReducer::new(),
        BookingState::existing(profile, booking),
        state.booking_env(),
        BookingAction::RequestDeposit { token: form.token },
    )
    .await?;

    match outcome {
        BookingAction::CheckoutReady { session_id, url } => {
            tracing::info!(booking_id = %id, %session_id, "Redirecting to checkout");
            Ok(Redirect::to(&url))
        },
        BookingAction::Rejected { reason } => Ok(flash::error(&back, &reason)),
        BookingAction::Failed { error } => {
            tracing::error!(booking_id = %id, %error, "Could not start deposit checkout");
            Ok(flash::error(
                &back,
                "Payments are temporarily unavailable, please try again in a few minutes",
            ))
        },
        other => Err(command_failed(other)),
    }
}

async fn deposit_return(state: AppState, id: Uuid, query: TokenQuery, completed: bool) -> WebResult<Html<String>> {
    let (booking, profile) = load_for_client(&state, id, &query.token).await?;
    render(&DepositReturnPage {
        chrome: Chrome::new(None, query.flash()),
        request: ClientView::new(&booking, &profile, &state.settings.deposit.currency),
        completed,
    })
}

/// `GET /requests/:id/deposit/success?token=`
///
/// The webhook marks the deposit paid; this page may load before it lands.
pub async fn deposit_success(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> WebResult<Html<String>> {
    deposit_return(state, id, query, true).await
}

/// `GET /requests/:id/deposit/cancel?token=`
pub async fn deposit_cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> WebResult<Html<String>> {
    deposit_return(state, id, query, false).await
}

/// Map a `Failed` (or unexpected) outcome to an error page.
pub(crate) fn command_failed(outcome: BookingAction) -> AppError {
    match outcome {
        BookingAction::Failed { error } => {
            AppError::unavailable("Service temporarily unavailable").with_source(anyhow::anyhow!(error))
        },
        other => AppError::internal("Unexpected result").with_source(anyhow::anyhow!("{other:?}")),
    }
}
