//! Booking request lifecycle.
//!
//! ```text
//! Submit ──► new ──Accept──► accepted ──Close──► closed    (deposit paid)
//!             │                 │
//!             └─────Decline─────┴──────────────► declined  (deposit unpaid)
//! ```
//!
//! Commands are validated against the loaded row and, when legal, produce a
//! single future effect that persists the change (compare-and-set on the
//! prior status), sends the notification emails and reports a result
//! action. Illegal commands report [`BookingAction::Rejected`].
//!
//! Deposits run alongside the status: the client opens a hosted checkout
//! for an accepted booking ([`BookingAction::RequestDeposit`]) and the
//! payment webhook marks it paid ([`BookingAction::DepositPaid`]).

use super::Outcome;
use crate::notifications::{self, Links};
use crate::providers::mailer::deliver_all;
use crate::providers::{CheckoutRequest, CheckoutStatus, Mailer, PaymentGateway};
use crate::repositories::{BookingRepository, RepositoryError};
use crate::types::{BookingRequest, BookingStatus, Profile};
use crate::validation::BookingInput;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use constant_time_eq::constant_time_eq;
use gigbook_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use gigbook_postgres::Actor;
use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

const NOT_FOUND: &str = "Booking request not found";

/// Longest decline note, in characters.
pub const MAX_DECLINE_REASON: usize = 500;

// ============================================================================
// Actions
// ============================================================================

/// Commands from handlers and the results their effects report.
#[derive(Clone, Debug)]
pub enum BookingAction {
    // Commands
    /// A client asks to book the DJ in state.
    Submit {
        /// Whoever filled in the form; usually anonymous.
        actor: Actor,
        /// Raw form.
        input: BookingInput,
    },

    /// The DJ takes the gig.
    Accept {
        /// Must own the profile.
        actor: Actor,
    },

    /// The DJ turns the gig down.
    Decline {
        /// Must own the profile.
        actor: Actor,
        /// Optional note for the client.
        reason: String,
    },

    /// The DJ marks a paid booking done.
    Close {
        /// Must own the profile.
        actor: Actor,
    },

    /// The client wants to pay the deposit.
    RequestDeposit {
        /// Client token from the status link.
        token: String,
    },

    /// The payment processor reported a completed checkout.
    DepositPaid {
        /// Checkout session that was paid.
        session_id: String,
        /// Processor payment reference.
        payment_intent_id: Option<String>,
    },

    // Results
    /// The request was stored and both sides notified.
    Submitted {
        /// The stored row, client token included.
        booking: BookingRequest,
    },

    /// A status transition was stored.
    StatusChanged {
        /// The updated row.
        booking: BookingRequest,
        /// Status before the change.
        from: BookingStatus,
    },

    /// A checkout session is ready for the client.
    CheckoutReady {
        /// Processor session id.
        session_id: String,
        /// Hosted checkout page.
        url: String,
    },

    /// The deposit was marked paid.
    DepositRecorded {
        /// The updated row.
        booking: BookingRequest,
    },

    /// The deposit had already been recorded; nothing changed.
    DepositAlreadyRecorded {
        /// Booking id.
        booking_id: Uuid,
    },

    /// The command is not allowed; `reason` is shown to the user.
    Rejected {
        /// User-facing explanation.
        reason: String,
    },

    /// A collaborator failed.
    Failed {
        /// Internal error text, logged but not shown.
        error: String,
    },
}

impl Outcome for BookingAction {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Submitted { .. }
                | Self::StatusChanged { .. }
                | Self::CheckoutReady { .. }
                | Self::DepositRecorded { .. }
                | Self::DepositAlreadyRecorded { .. }
                | Self::Rejected { .. }
                | Self::Failed { .. }
        )
    }
}

// ============================================================================
// State
// ============================================================================

/// The DJ being booked and, once it exists, the request.
#[derive(Clone, Debug)]
pub struct BookingState {
    /// Profile the request belongs to.
    pub profile: Profile,
    /// The request, `None` before submission.
    pub booking: Option<BookingRequest>,
    /// Last rejection or failure.
    pub last_error: Option<String>,
}

impl BookingState {
    /// State for a new submission.
    #[must_use]
    pub const fn for_profile(profile: Profile) -> Self {
        Self {
            profile,
            booking: None,
            last_error: None,
        }
    }

    /// State for an existing request.
    #[must_use]
    pub const fn existing(profile: Profile, booking: BookingRequest) -> Self {
        Self {
            profile,
            booking: Some(booking),
            last_error: None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Deposit charged when a DJ accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositSettings {
    /// Amount in minor units.
    pub amount_cents: i64,
    /// Lowercase ISO currency.
    pub currency: String,
}

/// Collaborators for the booking reducer.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Booking rows.
    pub bookings: Arc<dyn BookingRepository>,
    /// Hosted checkout.
    pub payments: Arc<dyn PaymentGateway>,
    /// Notifications.
    pub mailer: Arc<dyn Mailer>,
    /// Timestamps and "today" for date validation.
    pub clock: Arc<dyn Clock>,
    /// Absolute links for emails and checkout return URLs.
    pub links: Links,
    /// Deposit policy.
    pub deposit: DepositSettings,
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for booking requests.
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(reason: impl Into<String>) -> SmallVec<[Effect<BookingAction>; 4]> {
        smallvec![Effect::send(BookingAction::Rejected {
            reason: reason.into()
        })]
    }

    /// 32 random bytes, URL-safe base64.
    fn client_token() -> String {
        let mut bytes = [0_u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Checks ownership, the status graph and deposit gating for a DJ
    /// command. Returns the row to update.
    fn validate_transition(
        state: &BookingState,
        actor: &Actor,
        next: BookingStatus,
    ) -> Result<BookingRequest, String> {
        let booking = state.booking.as_ref().ok_or_else(|| NOT_FOUND.to_string())?;
        if booking.profile_id != state.profile.id || !state.profile.is_owned_by(actor.user_id()) {
            return Err("Only the DJ can update this request".to_string());
        }
        if booking.status.is_terminal() {
            return Err(format!(
                "This request is already {}",
                booking.status.label().to_lowercase()
            ));
        }
        if !booking.status.can_transition_to(next) {
            return Err(format!(
                "A {} request can't be {}",
                booking.status.as_str(),
                next.as_str()
            ));
        }
        match next {
            BookingStatus::Declined if booking.deposit_paid => Err(
                "The deposit has been paid, so this booking can't be declined. Close it once the gig is done."
                    .to_string(),
            ),
            BookingStatus::Closed if !booking.deposit_paid => {
                Err("A booking can only be closed once the deposit is paid".to_string())
            },
            _ => Ok(booking.clone()),
        }
    }

    /// Maps a repository failure to a result action.
    fn storage_failure(error: RepositoryError) -> BookingAction {
        match error {
            RepositoryError::Conflict(detail) => {
                tracing::info!(%detail, "Booking changed concurrently");
                BookingAction::Rejected {
                    reason: "This request was updated in the meantime. Reload the page and try again."
                        .to_string(),
                }
            },
            RepositoryError::NotFound => BookingAction::Rejected {
                reason: NOT_FOUND.to_string(),
            },
            RepositoryError::Database(error) => {
                tracing::error!(%error, "Booking persistence failed");
                BookingAction::Failed {
                    error: error.to_string(),
                }
            },
        }
    }

    fn submit(
        state: &BookingState,
        actor: Actor,
        input: &BookingInput,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        if !state.profile.published {
            return Self::reject("This DJ isn't taking bookings right now");
        }
        let now = env.clock.now();
        let fields = match input.validate(now.date_naive()) {
            Ok(fields) => fields,
            Err(error) => return Self::reject(error.message),
        };

        let booking = BookingRequest {
            id: Uuid::new_v4(),
            profile_id: state.profile.id,
            client_name: fields.client_name,
            client_email: fields.client_email,
            event_date: fields.event_date,
            event_type: fields.event_type,
            venue: fields.venue,
            guest_count: fields.guest_count,
            message: fields.message,
            status: BookingStatus::New,
            client_token: Self::client_token(),
            deposit_cents: None,
            deposit_paid: false,
            deposit_paid_at: None,
            checkout_session_id: None,
            payment_intent_id: None,
            decline_reason: None,
            created_at: now,
            updated_at: now,
        };

        let bookings = Arc::clone(&env.bookings);
        let mailer = Arc::clone(&env.mailer);
        let links = env.links.clone();
        let profile = state.profile.clone();

        smallvec![Effect::run(async move {
            if let Err(error) = bookings.insert(&actor, &booking).await {
                return Some(Self::storage_failure(error));
            }
            metrics::counter!("booking.submitted").increment(1);
            tracing::info!(booking_id = %booking.id, profile = %profile.slug, "Booking request submitted");

            let mut emails = vec![notifications::request_received(&profile, &booking, &links)];
            if !profile.contact_email.is_empty() {
                emails.push(notifications::new_request(&profile, &booking, &links));
            }
            deliver_all(mailer.as_ref(), emails).await;

            Some(BookingAction::Submitted { booking })
        })]
    }

    fn transition(
        actor: Actor,
        updated: BookingRequest,
        from: BookingStatus,
        state: &BookingState,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        let bookings = Arc::clone(&env.bookings);
        let mailer = Arc::clone(&env.mailer);
        let links = env.links.clone();
        let currency = env.deposit.currency.clone();
        let profile = state.profile.clone();

        smallvec![Effect::run(async move {
            if let Err(error) = bookings.update_status(&actor, &updated, from).await {
                return Some(Self::storage_failure(error));
            }
            metrics::counter!("booking.transitions", "to" => updated.status.as_str()).increment(1);
            tracing::info!(
                booking_id = %updated.id,
                from = %from,
                to = %updated.status,
                "Booking status changed"
            );

            let email = match updated.status {
                BookingStatus::Accepted => {
                    Some(notifications::accepted(&profile, &updated, &links, &currency))
                },
                BookingStatus::Declined => Some(notifications::declined(&profile, &updated)),
                BookingStatus::Closed => Some(notifications::closed(&profile, &updated)),
                BookingStatus::New => None,
            };
            deliver_all(mailer.as_ref(), email.into_iter().collect()).await;

            Some(BookingAction::StatusChanged {
                booking: updated,
                from,
            })
        })]
    }

    fn request_deposit(
        state: &BookingState,
        token: String,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        let Some(booking) = state.booking.clone() else {
            return Self::reject(NOT_FOUND);
        };
        if !constant_time_eq(token.as_bytes(), booking.client_token.as_bytes()) {
            return Self::reject(NOT_FOUND);
        }
        if booking.deposit_paid {
            return Self::reject("The deposit has already been paid");
        }
        if booking.status != BookingStatus::Accepted {
            return Self::reject("A deposit can be paid once the DJ accepts the request");
        }
        let Some(amount_cents) = booking.deposit_cents.filter(|cents| *cents > 0) else {
            return Self::reject("No deposit is due for this booking");
        };

        let return_path = |outcome: &str| {
            env.links.absolute(&format!(
                "/requests/{}/deposit/{outcome}?token={}",
                booking.id,
                urlencoding::encode(&token)
            ))
        };
        let request = CheckoutRequest {
            booking_id: booking.id,
            amount_cents,
            currency: env.deposit.currency.clone(),
            description: format!(
                "Deposit: {} on {}",
                state.profile.display_name,
                booking.event_date.format("%-d %B %Y")
            ),
            customer_email: booking.client_email.clone(),
            success_url: return_path("success"),
            cancel_url: return_path("cancel"),
            idempotency_key: CheckoutRequest::idempotency_key_for(
                booking.id,
                booking.checkout_session_id.as_deref(),
            ),
        };

        let bookings = Arc::clone(&env.bookings);
        let payments = Arc::clone(&env.payments);

        smallvec![Effect::run(async move {
            if let Some(previous) = booking.checkout_session_id.as_deref() {
                match payments.retrieve_checkout_session(previous).await {
                    Ok(session) => {
                        if let Some(url) = session.open_url() {
                            return Some(BookingAction::CheckoutReady {
                                session_id: session.id.clone(),
                                url: url.to_string(),
                            });
                        }
                        if session.status == CheckoutStatus::Complete {
                            return Some(BookingAction::Rejected {
                                reason: "Your deposit is being processed. Check back in a minute."
                                    .to_string(),
                            });
                        }
                    },
                    Err(error) => {
                        tracing::error!(%error, session_id = previous, "Checkout session lookup failed");
                        return Some(BookingAction::Failed {
                            error: error.to_string(),
                        });
                    },
                }
            }

            let session = match payments.create_checkout_session(&request).await {
                Ok(session) => session,
                Err(error) => {
                    tracing::error!(%error, booking_id = %booking.id, "Checkout session creation failed");
                    return Some(BookingAction::Failed {
                        error: error.to_string(),
                    });
                },
            };
            let Some(url) = session.open_url().map(ToString::to_string) else {
                return Some(BookingAction::Failed {
                    error: format!("checkout session {} is not open", session.id),
                });
            };

            // The token is the client's credential; no user session needed.
            if let Err(error) = bookings
                .record_checkout(&Actor::Anonymous, booking.id, &token, &session.id)
                .await
            {
                return Some(match error {
                    RepositoryError::Conflict(_) => BookingAction::Rejected {
                        reason: "This booking is no longer awaiting a deposit".to_string(),
                    },
                    other => Self::storage_failure(other),
                });
            }

            metrics::counter!("booking.checkout.created").increment(1);
            Some(BookingAction::CheckoutReady {
                session_id: session.id,
                url,
            })
        })]
    }

    fn deposit_paid(
        state: &BookingState,
        session_id: &str,
        payment_intent_id: Option<String>,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        let Some(mut booking) = state.booking.clone() else {
            return Self::reject(NOT_FOUND);
        };
        if booking.deposit_paid {
            return smallvec![Effect::send(BookingAction::DepositAlreadyRecorded {
                booking_id: booking.id
            })];
        }
        let awaiting = booking.status == BookingStatus::Accepted;
        if !awaiting {
            tracing::warn!(
                booking_id = %booking.id,
                status = %booking.status,
                "Deposit paid for a booking that is not awaiting one; recording it anyway"
            );
        }
        if booking.checkout_session_id.as_deref() != Some(session_id) {
            tracing::warn!(
                booking_id = %booking.id,
                session_id,
                "Paid checkout session is not the one on record"
            );
        }

        let paid_at = env.clock.now();
        let bookings = Arc::clone(&env.bookings);
        let mailer = Arc::clone(&env.mailer);
        let links = env.links.clone();
        let currency = env.deposit.currency.clone();
        let profile = state.profile.clone();

        smallvec![Effect::run(async move {
            match bookings
                .record_deposit(&Actor::Service, booking.id, payment_intent_id.as_deref(), paid_at)
                .await
            {
                Ok(true) => {},
                Ok(false) => {
                    return Some(BookingAction::DepositAlreadyRecorded {
                        booking_id: booking.id,
                    })
                },
                Err(error) => return Some(Self::storage_failure(error)),
            }

            booking.deposit_paid = true;
            booking.deposit_paid_at = Some(paid_at);
            booking.payment_intent_id = payment_intent_id;
            booking.updated_at = paid_at;
            metrics::counter!("booking.deposits.recorded").increment(1);
            tracing::info!(booking_id = %booking.id, "Deposit recorded");

            let mut emails = Vec::new();
            if !profile.contact_email.is_empty() {
                emails.push(notifications::deposit_paid_dj(&profile, &booking, &links, &currency));
            }
            if awaiting {
                emails.push(notifications::deposit_paid_client(&profile, &booking, &links, &currency));
            }
            deliver_all(mailer.as_ref(), emails).await;

            Some(BookingAction::DepositRecorded { booking })
        })]
    }

    /// Applies a result action to state.
    fn apply_result(state: &mut BookingState, action: BookingAction) {
        match action {
            BookingAction::Submitted { booking }
            | BookingAction::StatusChanged { booking, .. }
            | BookingAction::DepositRecorded { booking } => {
                state.booking = Some(booking);
                state.last_error = None;
            },
            BookingAction::CheckoutReady { session_id, .. } => {
                if let Some(booking) = state.booking.as_mut() {
                    booking.checkout_session_id = Some(session_id);
                }
                state.last_error = None;
            },
            BookingAction::DepositAlreadyRecorded { .. } => {
                if let Some(booking) = state.booking.as_mut() {
                    booking.deposit_paid = true;
                }
            },
            BookingAction::Rejected { reason } => state.last_error = Some(reason),
            BookingAction::Failed { error } => state.last_error = Some(error),

            // Commands are handled by `reduce`
            BookingAction::Submit { .. }
            | BookingAction::Accept { .. }
            | BookingAction::Decline { .. }
            | BookingAction::Close { .. }
            | BookingAction::RequestDeposit { .. }
            | BookingAction::DepositPaid { .. } => {},
        }
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::Submit { actor, input } => Self::submit(state, actor, &input, env),

            BookingAction::Accept { actor } => {
                match Self::validate_transition(state, &actor, BookingStatus::Accepted) {
                    Ok(mut updated) => {
                        let from = updated.status;
                        updated.status = BookingStatus::Accepted;
                        updated.deposit_cents =
                            Some(env.deposit.amount_cents).filter(|cents| *cents > 0);
                        updated.updated_at = env.clock.now();
                        Self::transition(actor, updated, from, state, env)
                    },
                    Err(reason) => Self::reject(reason),
                }
            },

            BookingAction::Decline { actor, reason } => {
                let reason = reason.trim().to_string();
                if reason.chars().count() > MAX_DECLINE_REASON {
                    return Self::reject(format!(
                        "Keep the note under {MAX_DECLINE_REASON} characters"
                    ));
                }
                match Self::validate_transition(state, &actor, BookingStatus::Declined) {
                    Ok(mut updated) => {
                        let from = updated.status;
                        updated.status = BookingStatus::Declined;
                        updated.decline_reason = Some(reason).filter(|r| !r.is_empty());
                        updated.updated_at = env.clock.now();
                        Self::transition(actor, updated, from, state, env)
                    },
                    Err(reason) => Self::reject(reason),
                }
            },

            BookingAction::Close { actor } => {
                match Self::validate_transition(state, &actor, BookingStatus::Closed) {
                    Ok(mut updated) => {
                        let from = updated.status;
                        updated.status = BookingStatus::Closed;
                        updated.updated_at = env.clock.now();
                        Self::transition(actor, updated, from, state, env)
                    },
                    Err(reason) => Self::reject(reason),
                }
            },

            BookingAction::RequestDeposit { token } => Self::request_deposit(state, token, env),

            BookingAction::DepositPaid {
                session_id,
                payment_intent_id,
            } => Self::deposit_paid(state, &session_id, payment_intent_id, env),

            result => {
                Self::apply_result(state, result);
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::providers::mocks::{MockPaymentGateway, RecordingMailer};
    use crate::repositories::{MemoryDatabase, ProfileRepository};
    use chrono::{NaiveDate, Utc};
    use gigbook_testing::{assertions, effects::single_action, test_clock, ReducerTest};

    struct Fixture {
        db: MemoryDatabase,
        payments: MockPaymentGateway,
        mailer: RecordingMailer,
        profile: Profile,
        owner: Actor,
    }

    impl Fixture {
        async fn new() -> Self {
            let owner_id = Uuid::new_v4();
            let profile = Profile {
                id: Uuid::new_v4(),
                user_id: owner_id,
                slug: "nova".into(),
                display_name: "DJ Nova".into(),
                city: "Berlin".into(),
                genres: vec!["House".into()],
                bio: String::new(),
                rate_from_cents: Some(50_000),
                contact_email: "nova@example.com".into(),
                avatar_url: None,
                published: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            let db = MemoryDatabase::new();
            db.save(&Actor::Service, &profile).await.unwrap();
            Self {
                db,
                payments: MockPaymentGateway::new(),
                mailer: RecordingMailer::new(),
                profile,
                owner: Actor::user(owner_id, Some("nova@example.com".into())),
            }
        }

        fn env(&self) -> BookingEnvironment {
            BookingEnvironment {
                bookings: Arc::new(self.db.clone()),
                payments: Arc::new(self.payments.clone()),
                mailer: Arc::new(self.mailer.clone()),
                clock: Arc::new(test_clock()),
                links: Links::new("https://gigbook.test"),
                deposit: DepositSettings {
                    amount_cents: 15_000,
                    currency: "usd".into(),
                },
            }
        }

        /// Store a request in `status` and return it.
        async fn booking(&self, status: BookingStatus, deposit_paid: bool) -> BookingRequest {
            let booking = BookingRequest {
                id: Uuid::new_v4(),
                profile_id: self.profile.id,
                client_name: "Sam".into(),
                client_email: "sam@example.com".into(),
                event_date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
                event_type: "Wedding".into(),
                venue: "The Loft".into(),
                guest_count: Some(120),
                message: String::new(),
                status,
                client_token: "secret-token".into(),
                deposit_cents: (status != BookingStatus::New).then_some(15_000),
                deposit_paid,
                deposit_paid_at: None,
                checkout_session_id: None,
                payment_intent_id: None,
                decline_reason: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.db.insert(&Actor::Anonymous, &booking).await.unwrap();
            booking
        }

        async fn run(&self, state: BookingState, action: BookingAction) -> BookingAction {
            let (_, effects) = ReducerTest::new(BookingReducer::new())
                .with_env(self.env())
                .given_state(state)
                .when_action(action)
                .then_effects(|effects| assertions::assert_effects_count(effects, 1))
                .run_into();
            single_action(effects).await
        }

        fn stored(&self, id: Uuid) -> BookingRequest {
            self.db
                .all_bookings()
                .into_iter()
                .find(|b| b.id == id)
                .expect("booking stored")
        }
    }

    fn submission() -> BookingInput {
        BookingInput {
            client_name: "Sam".into(),
            client_email: "sam@example.com".into(),
            event_date: "2025-06-14".into(),
            event_type: "Wedding".into(),
            venue: "The Loft".into(),
            guest_count: "120".into(),
            message: "First dance is at 9".into(),
        }
    }

    fn rejected(action: &BookingAction) -> &str {
        match action {
            BookingAction::Rejected { reason } => reason,
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    // ========== Submit ==========

    #[tokio::test]
    async fn submit_stores_request_and_notifies_both_sides() {
        let fx = Fixture::new().await;
        let action = fx
            .run(
                BookingState::for_profile(fx.profile.clone()),
                BookingAction::Submit {
                    actor: Actor::Anonymous,
                    input: submission(),
                },
            )
            .await;

        let BookingAction::Submitted { booking } = action else {
            panic!("expected Submitted, got {action:?}");
        };
        assert_eq!(booking.status, BookingStatus::New);
        assert_eq!(booking.client_token.len(), 43);
        assert_eq!(fx.stored(booking.id), booking);
        assert_eq!(fx.mailer.sent_to("sam@example.com").len(), 1);
        assert_eq!(fx.mailer.sent_to("nova@example.com").len(), 1);
    }

    #[tokio::test]
    async fn submit_tokens_are_unique() {
        let fx = Fixture::new().await;
        let mut tokens = Vec::new();
        for _ in 0..2 {
            let action = fx
                .run(
                    BookingState::for_profile(fx.profile.clone()),
                    BookingAction::Submit {
                        actor: Actor::Anonymous,
                        input: submission(),
                    },
                )
                .await;
            if let BookingAction::Submitted { booking } = action {
                tokens.push(booking.client_token);
            }
        }
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn submit_rejects_past_event_date() {
        let fx = Fixture::new().await;
        let mut input = submission();
        input.event_date = "2024-12-31".into();

        let action = fx
            .run(
                BookingState::for_profile(fx.profile.clone()),
                BookingAction::Submit {
                    actor: Actor::Anonymous,
                    input,
                },
            )
            .await;
        assert_eq!(rejected(&action), "The event date is in the past");
        assert!(fx.db.all_bookings().is_empty());
        assert!(fx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn submit_to_draft_profile_is_rejected() {
        let fx = Fixture::new().await;
        let mut draft = fx.profile.clone();
        draft.published = false;

        let action = fx
            .run(
                BookingState::for_profile(draft),
                BookingAction::Submit {
                    actor: Actor::Anonymous,
                    input: submission(),
                },
            )
            .await;
        assert!(rejected(&action).contains("isn't taking bookings"));
    }

    #[tokio::test]
    async fn submit_survives_mail_outage() {
        let fx = Fixture::new().await;
        fx.mailer.set_failing(true);

        let action = fx
            .run(
                BookingState::for_profile(fx.profile.clone()),
                BookingAction::Submit {
                    actor: Actor::Anonymous,
                    input: submission(),
                },
            )
            .await;
        assert!(matches!(action, BookingAction::Submitted { .. }));
        assert_eq!(fx.db.all_bookings().len(), 1);
    }

    // ========== Transitions ==========

    #[tokio::test]
    async fn transition_table() {
        use BookingStatus::{Accepted, Closed, Declined, New};

        enum Command {
            Accept,
            Decline,
            Close,
        }

        let cases = [
            (New, false, Command::Accept, Some(Accepted)),
            (New, false, Command::Decline, Some(Declined)),
            (New, false, Command::Close, None),
            (Accepted, false, Command::Accept, None),
            (Accepted, false, Command::Decline, Some(Declined)),
            (Accepted, true, Command::Decline, None),
            (Accepted, false, Command::Close, None),
            (Accepted, true, Command::Close, Some(Closed)),
            (Declined, false, Command::Accept, None),
            (Declined, false, Command::Close, None),
            (Closed, true, Command::Decline, None),
            (Closed, true, Command::Accept, None),
        ];

        for (from, paid, command, expected) in cases {
            let fx = Fixture::new().await;
            let booking = fx.booking(from, paid).await;
            let actor = fx.owner.clone();
            let action = match command {
                Command::Accept => BookingAction::Accept { actor },
                Command::Decline => BookingAction::Decline {
                    actor,
                    reason: String::new(),
                },
                Command::Close => BookingAction::Close { actor },
            };
            let label = format!("{from} (paid: {paid}) {action:?}");

            let result = fx
                .run(BookingState::existing(fx.profile.clone(), booking.clone()), action)
                .await;

            match expected {
                Some(to) => {
                    let BookingAction::StatusChanged { booking: updated, from: prior } = result else {
                        panic!("{label}: expected StatusChanged, got {result:?}");
                    };
                    assert_eq!(prior, from, "{label}");
                    assert_eq!(updated.status, to, "{label}");
                    assert_eq!(fx.stored(booking.id).status, to, "{label}");
                },
                None => {
                    assert!(
                        matches!(result, BookingAction::Rejected { .. }),
                        "{label}: expected Rejected, got {result:?}"
                    );
                    assert_eq!(fx.stored(booking.id).status, from, "{label}");
                },
            }
        }
    }

    #[tokio::test]
    async fn only_the_owner_can_accept() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::New, false).await;

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), booking.clone()),
                BookingAction::Accept {
                    actor: Actor::user(Uuid::new_v4(), None),
                },
            )
            .await;
        assert_eq!(rejected(&action), "Only the DJ can update this request");

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), booking),
                BookingAction::Accept {
                    actor: Actor::Anonymous,
                },
            )
            .await;
        assert!(matches!(action, BookingAction::Rejected { .. }));
    }

    #[tokio::test]
    async fn accept_sets_deposit_and_emails_client() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::New, false).await;

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), booking.clone()),
                BookingAction::Accept {
                    actor: fx.owner.clone(),
                },
            )
            .await;

        assert!(matches!(action, BookingAction::StatusChanged { .. }));
        assert_eq!(fx.stored(booking.id).deposit_cents, Some(15_000));
        let sent = fx.mailer.sent_to("sam@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("$150.00"));
    }

    #[tokio::test]
    async fn decline_keeps_trimmed_reason() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::New, false).await;

        fx.run(
            BookingState::existing(fx.profile.clone(), booking.clone()),
            BookingAction::Decline {
                actor: fx.owner.clone(),
                reason: "  Already booked that night ".into(),
            },
        )
        .await;

        assert_eq!(
            fx.stored(booking.id).decline_reason.as_deref(),
            Some("Already booked that night")
        );
        assert!(fx.mailer.sent_to("sam@example.com")[0]
            .text
            .contains("Already booked that night"));
    }

    #[tokio::test]
    async fn decline_rejects_overlong_reason() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::New, false).await;

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), booking),
                BookingAction::Decline {
                    actor: fx.owner.clone(),
                    reason: "x".repeat(MAX_DECLINE_REASON + 1),
                },
            )
            .await;
        assert!(rejected(&action).contains("500"));
    }

    #[tokio::test]
    async fn losing_the_race_is_a_conflict() {
        let fx = Fixture::new().await;
        // Stored row already declined; the loaded copy is stale.
        let mut stale = fx.booking(BookingStatus::Declined, false).await;
        stale.status = BookingStatus::New;

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), stale.clone()),
                BookingAction::Accept {
                    actor: fx.owner.clone(),
                },
            )
            .await;
        assert!(rejected(&action).contains("updated in the meantime"));
        assert_eq!(fx.stored(stale.id).status, BookingStatus::Declined);
        assert!(fx.mailer.sent().is_empty());
    }

    // ========== Deposits ==========

    #[tokio::test]
    async fn request_deposit_opens_checkout_and_records_session() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::Accepted, false).await;

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), booking.clone()),
                BookingAction::RequestDeposit {
                    token: "secret-token".into(),
                },
            )
            .await;

        let BookingAction::CheckoutReady { session_id, url } = action else {
            panic!("expected CheckoutReady, got {action:?}");
        };
        assert_eq!(url, format!("https://checkout.test/pay/{session_id}"));
        assert_eq!(fx.stored(booking.id).checkout_session_id, Some(session_id));

        let request = &fx.payments.requests()[0];
        assert_eq!(request.amount_cents, 15_000);
        assert_eq!(
            request.idempotency_key,
            format!("deposit-{}-initial", booking.id)
        );
        assert!(request
            .success_url
            .starts_with(&format!("https://gigbook.test/requests/{}/deposit/success", booking.id)));
    }

    #[tokio::test]
    async fn repeated_deposit_requests_share_one_session() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::Accepted, false).await;
        let state = BookingState::existing(fx.profile.clone(), booking.clone());
        let command = || BookingAction::RequestDeposit {
            token: "secret-token".into(),
        };

        // Two clicks racing from the same page state.
        let first = fx.run(state.clone(), command()).await;
        let second = fx.run(state, command()).await;
        assert_eq!(fx.payments.session_count(), 1);

        // A later click sees the recorded session and reuses it.
        let reloaded = BookingState::existing(fx.profile.clone(), fx.stored(booking.id));
        let third = fx.run(reloaded, command()).await;
        assert_eq!(fx.payments.session_count(), 1);

        for action in [first, second, third] {
            assert!(matches!(
                action,
                BookingAction::CheckoutReady { ref session_id, .. } if session_id == "cs_test_1"
            ));
        }
    }

    #[tokio::test]
    async fn expired_session_is_replaced() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::Accepted, false).await;
        let command = || BookingAction::RequestDeposit {
            token: "secret-token".into(),
        };

        fx.run(BookingState::existing(fx.profile.clone(), booking.clone()), command())
            .await;
        fx.payments.set_status("cs_test_1", CheckoutStatus::Expired);

        let reloaded = BookingState::existing(fx.profile.clone(), fx.stored(booking.id));
        let action = fx.run(reloaded, command()).await;

        assert!(matches!(
            action,
            BookingAction::CheckoutReady { ref session_id, .. } if session_id == "cs_test_2"
        ));
        assert_eq!(
            fx.payments.requests().last().unwrap().idempotency_key,
            format!("deposit-{}-cs_test_1", booking.id)
        );
        assert_eq!(
            fx.stored(booking.id).checkout_session_id.as_deref(),
            Some("cs_test_2")
        );
    }

    #[tokio::test]
    async fn deposit_requires_token_and_accepted_status() {
        let fx = Fixture::new().await;

        let accepted = fx.booking(BookingStatus::Accepted, false).await;
        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), accepted),
                BookingAction::RequestDeposit {
                    token: "guess".into(),
                },
            )
            .await;
        assert_eq!(rejected(&action), NOT_FOUND);

        let fresh = fx.booking(BookingStatus::New, false).await;
        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), fresh),
                BookingAction::RequestDeposit {
                    token: "secret-token".into(),
                },
            )
            .await;
        assert!(rejected(&action).contains("once the DJ accepts"));

        let paid = fx.booking(BookingStatus::Accepted, true).await;
        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), paid),
                BookingAction::RequestDeposit {
                    token: "secret-token".into(),
                },
            )
            .await;
        assert_eq!(rejected(&action), "The deposit has already been paid");
        assert_eq!(fx.payments.session_count(), 0);
    }

    #[tokio::test]
    async fn processor_outage_fails_without_recording() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::Accepted, false).await;
        fx.payments.set_unavailable(true);

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), booking.clone()),
                BookingAction::RequestDeposit {
                    token: "secret-token".into(),
                },
            )
            .await;
        assert!(matches!(action, BookingAction::Failed { .. }));
        assert_eq!(fx.stored(booking.id).checkout_session_id, None);
    }

    #[tokio::test]
    async fn deposit_paid_records_once_and_notifies() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::Accepted, false).await;
        let paid = || BookingAction::DepositPaid {
            session_id: "cs_test_1".into(),
            payment_intent_id: Some("pi_123".into()),
        };

        let action = fx
            .run(BookingState::existing(fx.profile.clone(), booking.clone()), paid())
            .await;
        let BookingAction::DepositRecorded { booking: updated } = action else {
            panic!("expected DepositRecorded, got {action:?}");
        };
        assert!(updated.deposit_paid);
        assert_eq!(updated.deposit_paid_at, Some(test_clock().now()));

        let stored = fx.stored(booking.id);
        assert!(stored.deposit_paid);
        assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_123"));
        assert_eq!(fx.mailer.sent_to("nova@example.com").len(), 1);
        assert_eq!(fx.mailer.sent_to("sam@example.com").len(), 1);

        // Replay with the stale pre-payment row: the repository says no.
        let replay = fx
            .run(BookingState::existing(fx.profile.clone(), booking.clone()), paid())
            .await;
        assert!(matches!(replay, BookingAction::DepositAlreadyRecorded { .. }));

        // Replay with the fresh row short-circuits.
        let replay = fx
            .run(BookingState::existing(fx.profile.clone(), stored), paid())
            .await;
        assert!(matches!(replay, BookingAction::DepositAlreadyRecorded { .. }));
        assert_eq!(fx.mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn deposit_for_declined_booking_is_still_recorded() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::Declined, false).await;

        let action = fx
            .run(
                BookingState::existing(fx.profile.clone(), booking.clone()),
                BookingAction::DepositPaid {
                    session_id: "cs_test_9".into(),
                    payment_intent_id: None,
                },
            )
            .await;

        assert!(matches!(action, BookingAction::DepositRecorded { .. }));
        assert!(fx.stored(booking.id).deposit_paid);
        // The DJ hears about it; the client is not told they're booked.
        assert_eq!(fx.mailer.sent_to("nova@example.com").len(), 1);
        assert!(fx.mailer.sent_to("sam@example.com").is_empty());
    }

    // ========== Results ==========

    #[tokio::test]
    async fn results_update_state_without_effects() {
        let fx = Fixture::new().await;
        let booking = fx.booking(BookingStatus::New, false).await;
        let mut accepted = booking.clone();
        accepted.status = BookingStatus::Accepted;

        ReducerTest::new(BookingReducer::new())
            .with_env(fx.env())
            .given_state(BookingState::existing(fx.profile.clone(), booking))
            .when_action(BookingAction::StatusChanged {
                booking: accepted,
                from: BookingStatus::New,
            })
            .when_action(BookingAction::CheckoutReady {
                session_id: "cs_test_1".into(),
                url: "https://checkout.test/pay/cs_test_1".into(),
            })
            .then_state(|state| {
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Accepted);
                assert_eq!(booking.checkout_session_id.as_deref(), Some("cs_test_1"));
                assert_eq!(state.last_error, None);
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(BookingReducer::new())
            .with_env(fx.env())
            .given_state(BookingState::for_profile(fx.profile.clone()))
            .when_action(BookingAction::Rejected {
                reason: "nope".into(),
            })
            .then_state(|state| assert_eq!(state.last_error.as_deref(), Some("nope")))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn terminal_actions() {
        assert!(BookingAction::Failed { error: String::new() }.is_terminal());
        assert!(!BookingAction::Close {
            actor: Actor::Anonymous
        }
        .is_terminal());
    }
}
