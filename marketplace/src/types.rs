//! Domain types for Gigbook.
//!
//! Rows mirror the hosted schema (`profiles`, `booking_requests`,
//! `waitlist_entries`). Status enums map onto the Postgres enums of the same
//! name.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Booking status
// ============================================================================

/// Lifecycle of a booking request.
///
/// ```text
/// new ──► accepted ──► closed     (deposit paid)
///  │          │
///  └──────────┴──────► declined   (deposit not paid)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Submitted by the client, awaiting the DJ.
    New,
    /// Accepted by the DJ; a deposit can be collected.
    Accepted,
    /// Declined by the DJ.
    Declined,
    /// Gig confirmed and done with.
    Closed,
}

impl BookingStatus {
    /// All statuses in dashboard order.
    pub const ALL: [Self; 4] = [Self::New, Self::Accepted, Self::Declined, Self::Closed];

    /// Database/wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Closed => "closed",
        }
    }

    /// Human label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Accepted => "Accepted",
            Self::Declined => "Declined",
            Self::Closed => "Closed",
        }
    }

    /// Declined and closed requests never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Closed)
    }

    /// Whether the status graph has an edge `self → next`.
    ///
    /// Deposit gating (decline only while unpaid, close only once paid) is
    /// checked separately by the booking reducer.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Accepted | Self::Declined)
                | (Self::Accepted, Self::Declined | Self::Closed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

// ============================================================================
// Waitlist
// ============================================================================

/// Which side of the marketplace a waitlist signup is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "waitlist_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WaitlistRole {
    /// Wants to be booked.
    Dj,
    /// Wants to book.
    Client,
}

impl WaitlistRole {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dj => "dj",
            Self::Client => "client",
        }
    }
}

impl FromStr for WaitlistRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dj" => Ok(Self::Dj),
            "client" => Ok(Self::Client),
            other => Err(format!("unknown waitlist role: {other}")),
        }
    }
}

/// A waitlist signup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct WaitlistEntry {
    /// Row id.
    pub id: Uuid,
    /// Contact address, unique case-insensitively.
    pub email: String,
    /// DJ or client.
    pub role: WaitlistRole,
    /// Optional home city.
    pub city: Option<String>,
    /// Signup time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Money
// ============================================================================

/// An amount in minor units with its currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Minor units (cents).
    pub cents: i64,
    /// Lowercase ISO 4217 code.
    pub currency: String,
}

impl Money {
    /// Create an amount.
    #[must_use]
    pub fn new(cents: i64, currency: impl Into<String>) -> Self {
        Self {
            cents,
            currency: currency.into().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        let (major, minor) = (abs / 100, abs % 100);
        match self.currency.as_str() {
            "usd" => write!(f, "{sign}${major}.{minor:02}"),
            "eur" => write!(f, "{sign}€{major}.{minor:02}"),
            "gbp" => write!(f, "{sign}£{major}.{minor:02}"),
            other => write!(f, "{sign}{major}.{minor:02} {}", other.to_ascii_uppercase()),
        }
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// A DJ's marketplace listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Profile {
    /// Row id.
    pub id: Uuid,
    /// Owning auth user.
    pub user_id: Uuid,
    /// Public URL segment, `/dj/{slug}`.
    pub slug: String,
    /// Stage name.
    pub display_name: String,
    /// Home city.
    pub city: String,
    /// Genres, trimmed and de-duplicated.
    pub genres: Vec<String>,
    /// Free-form bio.
    pub bio: String,
    /// Starting rate in cents.
    pub rate_from_cents: Option<i64>,
    /// Where booking notifications go.
    pub contact_email: String,
    /// Public avatar URL.
    pub avatar_url: Option<String>,
    /// Listed in the directory.
    pub published: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Fields still missing before the profile may be published.
    #[must_use]
    pub fn missing_for_publish(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.display_name.trim().is_empty() {
            missing.push("display name");
        }
        if self.city.trim().is_empty() {
            missing.push("city");
        }
        if self.genres.is_empty() {
            missing.push("at least one genre");
        }
        if self.contact_email.trim().is_empty() {
            missing.push("contact email");
        }
        missing
    }

    /// Whether `user_id` owns this profile.
    #[must_use]
    pub fn is_owned_by(&self, user_id: Option<Uuid>) -> bool {
        user_id == Some(self.user_id)
    }
}

/// Directory filters from `/?city=&genre=`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryFilter {
    /// Case-insensitive city match.
    #[serde(default)]
    pub city: Option<String>,
    /// Case-insensitive genre match.
    #[serde(default)]
    pub genre: Option<String>,
}

impl DirectoryFilter {
    /// Drop blank filter values.
    #[must_use]
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            city: clean(self.city),
            genre: clean(self.genre),
        }
    }

    /// In-process version of the directory query.
    #[must_use]
    pub fn matches(&self, profile: &Profile) -> bool {
        let city_ok = self
            .city
            .as_deref()
            .is_none_or(|city| profile.city.trim().eq_ignore_ascii_case(city));
        let genre_ok = self.genre.as_deref().is_none_or(|genre| {
            profile
                .genres
                .iter()
                .any(|g| g.eq_ignore_ascii_case(genre))
        });
        city_ok && genre_ok
    }
}

// ============================================================================
// Booking requests
// ============================================================================

/// A client's request to book a DJ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BookingRequest {
    /// Row id.
    pub id: Uuid,
    /// Requested DJ.
    pub profile_id: Uuid,
    /// Client name.
    pub client_name: String,
    /// Client address for notifications.
    pub client_email: String,
    /// Gig date.
    pub event_date: NaiveDate,
    /// Wedding, club night, ...
    pub event_type: String,
    /// Venue name or address.
    pub venue: String,
    /// Expected guests.
    pub guest_count: Option<i32>,
    /// Free-form message.
    pub message: String,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Secret for the client's status link.
    #[serde(skip)]
    pub client_token: String,
    /// Deposit set when the DJ accepts.
    pub deposit_cents: Option<i64>,
    /// Set by the payment webhook.
    pub deposit_paid: bool,
    /// When the deposit cleared.
    pub deposit_paid_at: Option<DateTime<Utc>>,
    /// Latest checkout session.
    pub checkout_session_id: Option<String>,
    /// Processor payment reference.
    pub payment_intent_id: Option<String>,
    /// Optional note shown to the client on decline.
    pub decline_reason: Option<String>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl BookingRequest {
    /// Path of the client's status page, token included.
    #[must_use]
    pub fn status_path(&self) -> String {
        format!(
            "/requests/{}?token={}",
            self.id,
            urlencoding::encode(&self.client_token)
        )
    }
}
