//! The DJ's inbox of booking requests.

use super::booking::command_failed;
use super::{actor_for, money, not_found, render, Chrome};
use crate::aggregates::booking::{BookingAction, BookingReducer, BookingState};
use crate::aggregates::execute;
use crate::server::AppState;
use crate::types::{BookingRequest, BookingStatus, Profile};
use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{Html, Redirect};
use axum::Form;
use gigbook_auth::CurrentUser;
use gigbook_postgres::Actor;
use gigbook_web::{flash, Flash, WebResult};
use serde::Deserialize;
use uuid::Uuid;

/// One row of the inbox.
#[derive(Debug, Clone)]
pub struct RequestRow {
    /// Detail page.
    pub href: String,
    /// Client name.
    pub client_name: String,
    /// Event date.
    pub event_date: String,
    /// Event type.
    pub event_type: String,
    /// Venue.
    pub venue: String,
    /// Deposit received.
    pub deposit_paid: bool,
}

impl RequestRow {
    fn new(booking: &BookingRequest) -> Self {
        Self {
            href: format!("/dashboard/requests/{}", booking.id),
            client_name: booking.client_name.clone(),
            event_date: booking.event_date.format("%a %-d %b %Y").to_string(),
            event_type: booking.event_type.clone(),
            venue: booking.venue.clone(),
            deposit_paid: booking.deposit_paid,
        }
    }
}

/// Requests sharing a status.
#[derive(Debug, Clone)]
pub struct RequestGroup {
    /// Status label.
    pub label: &'static str,
    /// Status class for styling.
    pub class: &'static str,
    /// Requests, newest first.
    pub rows: Vec<RequestRow>,
}

/// Group requests by status in lifecycle order. Empty groups are kept so
/// the inbox always shows every column.
fn group_by_status(bookings: &[BookingRequest]) -> Vec<RequestGroup> {
    BookingStatus::ALL
        .iter()
        .map(|status| RequestGroup {
            label: status.label(),
            class: status.as_str(),
            rows: bookings
                .iter()
                .filter(|b| b.status == *status)
                .map(RequestRow::new)
                .collect(),
        })
        .collect()
}

/// Everything on the request detail page.
#[derive(Debug, Clone)]
pub struct RequestDetail {
    /// Form action prefix.
    pub base: String,
    /// Client name.
    pub client_name: String,
    /// Client email.
    pub client_email: String,
    /// Event date.
    pub event_date: String,
    /// Event type.
    pub event_type: String,
    /// Venue.
    pub venue: String,
    /// Expected guests.
    pub guest_count: Option<i32>,
    /// Client message.
    pub message: String,
    /// Status label.
    pub status: &'static str,
    /// Status class.
    pub status_class: &'static str,
    /// Formatted deposit, once set.
    pub deposit: Option<String>,
    /// Deposit received.
    pub deposit_paid: bool,
    /// When the deposit arrived.
    pub deposit_paid_at: Option<String>,
    /// Decline note.
    pub decline_reason: Option<String>,
    /// Received at.
    pub received: String,
    /// Accept is allowed.
    pub can_accept: bool,
    /// Decline is allowed.
    pub can_decline: bool,
    /// Close is allowed.
    pub can_close: bool,
}

impl RequestDetail {
    fn new(booking: &BookingRequest, currency: &str) -> Self {
        let status = booking.status;
        Self {
            base: format!("/dashboard/requests/{}", booking.id),
            client_name: booking.client_name.clone(),
            client_email: booking.client_email.clone(),
            event_date: booking.event_date.format("%A %-d %B %Y").to_string(),
            event_type: booking.event_type.clone(),
            venue: booking.venue.clone(),
            guest_count: booking.guest_count,
            message: booking.message.clone(),
            status: status.label(),
            status_class: status.as_str(),
            deposit: booking.deposit_cents.map(|cents| money(cents, currency)),
            deposit_paid: booking.deposit_paid,
            deposit_paid_at: booking
                .deposit_paid_at
                .map(|at| at.format("%-d %b %Y %H:%M UTC").to_string()),
            decline_reason: booking.decline_reason.clone(),
            received: booking.created_at.format("%-d %b %Y").to_string(),
            can_accept: status.can_transition_to(BookingStatus::Accepted),
            can_decline: status.can_transition_to(BookingStatus::Declined) && !booking.deposit_paid,
            can_close: status.can_transition_to(BookingStatus::Closed) && booking.deposit_paid,
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage {
    chrome: Chrome,
    profile: Option<Profile>,
    groups: Vec<RequestGroup>,
    total: usize,
}

#[derive(Template)]
#[template(path = "request_detail.html")]
struct RequestDetailPage {
    chrome: Chrome,
    request: RequestDetail,
}

/// Decline form.
#[derive(Debug, Deserialize)]
pub struct DeclineForm {
    /// Optional note for the client.
    #[serde(default)]
    pub reason: String,
}

/// The signed-in DJ's profile and one of its requests.
///
/// Anything that is not theirs is a 404, never a 403.
async fn load_owned(state: &AppState, actor: &Actor, id: Uuid) -> WebResult<(Profile, BookingRequest)> {
    let user_id = actor.user_id().ok_or_else(not_found)?;
    let profile = state
        .services
        .profiles
        .find_by_user(actor, user_id)
        .await?
        .ok_or_else(not_found)?;
    let booking = state
        .services
        .bookings
        .find(actor, id)
        .await?
        .filter(|b| b.profile_id == profile.id)
        .ok_or_else(not_found)?;
    Ok((profile, booking))
}

/// `GET /dashboard`
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(flash): Query<Flash>,
) -> WebResult<Html<String>> {
    let actor = actor_for(&user);
    let profile = state.services.profiles.find_by_user(&actor, user.id).await?;
    let bookings = match &profile {
        Some(profile) => state.services.bookings.list_for_profile(&actor, profile.id).await?,
        None => Vec::new(),
    };

    render(&DashboardPage {
        chrome: Chrome::new(Some(&user), flash),
        groups: group_by_status(&bookings),
        total: bookings.len(),
        profile,
    })
}

/// `GET /dashboard/requests/:id`
pub async fn show(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Query(flash): Query<Flash>,
) -> WebResult<Html<String>> {
    let (_, booking) = load_owned(&state, &actor_for(&user), id).await?;
    render(&RequestDetailPage {
        chrome: Chrome::new(Some(&user), flash),
        request: RequestDetail::new(&booking, &state.settings.deposit.currency),
    })
}

async fn transition(state: &AppState, actor: Actor, id: Uuid, command: BookingAction, done: &str) -> WebResult<Redirect> {
    let (profile, booking) = load_owned(state, &actor, id).await?;
    let back = format!("/dashboard/requests/{id}");

    let outcome = execute(
        BookingReducer::new(),
        BookingState::existing(profile, booking),
        state.booking_env(),
        command,
    )
    .await?;

    match outcome {
        BookingAction::StatusChanged { .. } => Ok(flash::message(&back, done)),
        BookingAction::Rejected { reason } => Ok(flash::error(&back, &reason)),
        other => Err(command_failed(other)),
    }
}

/// `POST /dashboard/requests/:id/accept`
pub async fn accept(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> WebResult<Redirect> {
    let actor = actor_for(&user);
    let command = BookingAction::Accept { actor: actor.clone() };
    transition(&state, actor, id, command, "Request accepted. The client can now pay the deposit.").await
}

/// `POST /dashboard/requests/:id/decline`
pub async fn decline(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Form(form): Form<DeclineForm>,
) -> WebResult<Redirect> {
    let actor = actor_for(&user);
    let command = BookingAction::Decline {
        actor: actor.clone(),
        reason: form.reason,
    };
    transition(&state, actor, id, command, "Request declined").await
}

/// `POST /dashboard/requests/:id/close`
pub async fn close(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> WebResult<Redirect> {
    let actor = actor_for(&user);
    let command = BookingAction::Close { actor: actor.clone() };
    transition(&state, actor, id, command, "Booking closed").await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn booking(status: BookingStatus, deposit_paid: bool) -> BookingRequest {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        BookingRequest {
            id: Uuid::new_v4(),
            profile_id: Uuid::new_v4(),
            client_name: "Ada".to_string(),
            client_email: "ada@example.com".to_string(),
            event_date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            event_type: "Wedding".to_string(),
            venue: "Harbour Hall".to_string(),
            guest_count: None,
            message: String::new(),
            status,
            client_token: "t".to_string(),
            deposit_cents: Some(10_000),
            deposit_paid,
            deposit_paid_at: None,
            checkout_session_id: None,
            payment_intent_id: None,
            decline_reason: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn groups_follow_lifecycle_order() {
        let bookings = vec![
            booking(BookingStatus::Closed, true),
            booking(BookingStatus::New, false),
            booking(BookingStatus::New, false),
        ];
        let groups = group_by_status(&bookings);
        let counts: Vec<(&str, usize)> = groups.iter().map(|g| (g.class, g.rows.len())).collect();
        assert_eq!(counts, vec![("new", 2), ("accepted", 0), ("declined", 0), ("closed", 1)]);
    }

    #[test]
    fn actions_follow_deposit_gating() {
        let fresh = RequestDetail::new(&booking(BookingStatus::New, false), "usd");
        assert!(fresh.can_accept && fresh.can_decline && !fresh.can_close);

        let unpaid = RequestDetail::new(&booking(BookingStatus::Accepted, false), "usd");
        assert!(!unpaid.can_accept && unpaid.can_decline && !unpaid.can_close);

        let paid = RequestDetail::new(&booking(BookingStatus::Accepted, true), "usd");
        assert!(!paid.can_decline && paid.can_close);
        assert_eq!(paid.deposit.as_deref(), Some("$100.00"));

        let closed = RequestDetail::new(&booking(BookingStatus::Closed, true), "usd");
        assert!(!closed.can_accept && !closed.can_decline && !closed.can_close);
    }
}
