//! Form validation.
//!
//! Each form arrives as raw strings. `validate` turns it into checked
//! values or a [`ValidationError`] naming the first offending field; the
//! message is shown to the user as-is.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Slugs that would shadow a route.
pub const RESERVED_SLUGS: &[&str] = &[
    "admin",
    "api",
    "dashboard",
    "login",
    "logout",
    "signup",
    "auth",
    "djs",
    "requests",
    "webhooks",
    "waitlist",
    "health",
    "static",
];

/// Maximum number of genres on a profile.
pub const MAX_GENRES: usize = 10;

/// A rejected form field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Form field name.
    pub field: &'static str,
    /// User-facing explanation.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

/// Trimmed `value` if its length in characters is within `min..=max`.
///
/// # Errors
///
/// Returns a [`ValidationError`] for `field` otherwise.
pub fn text(field: &'static str, label: &str, value: &str, min: usize, max: usize) -> Result<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(if min == 1 {
            ValidationError::new(field, format!("{label} is required"))
        } else {
            ValidationError::new(field, format!("{label} must be at least {min} characters"))
        });
    }
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("{label} must be at most {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Normalize and check a profile slug.
///
/// Lowercases, then requires `[a-z0-9-]`, 3 to 40 characters, no leading,
/// trailing or doubled hyphen, and no reserved word.
///
/// # Errors
///
/// Returns a [`ValidationError`] on the `slug` field.
pub fn slug(value: &str) -> Result<String> {
    let slug = value.trim().to_lowercase();
    let len = slug.chars().count();
    if !(3..=40).contains(&len) {
        return Err(ValidationError::new("slug", "URL must be 3 to 40 characters"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::new(
            "slug",
            "URL may only contain letters, numbers and hyphens",
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return Err(ValidationError::new(
            "slug",
            "URL cannot start or end with a hyphen or contain two in a row",
        ));
    }
    if RESERVED_SLUGS.contains(&slug.as_str()) {
        return Err(ValidationError::new("slug", "That URL is reserved"));
    }
    Ok(slug)
}

/// Suggest a slug from a display name. The result may still fail [`slug`].
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    trimmed.chars().take(40).collect::<String>().trim_end_matches('-').to_string()
}

/// Split a comma-separated genre list.
///
/// Entries are trimmed, blanks dropped, duplicates removed ignoring case
/// (first spelling wins).
///
/// # Errors
///
/// Returns a [`ValidationError`] on the `genres` field when there are more
/// than [`MAX_GENRES`] entries or one is longer than 32 characters.
pub fn genres(value: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for genre in value.split(',').map(str::trim).filter(|g| !g.is_empty()) {
        if genre.chars().count() > 32 {
            return Err(ValidationError::new(
                "genres",
                format!("Genre \"{genre}\" is longer than 32 characters"),
            ));
        }
        if seen.insert(genre.to_lowercase()) {
            out.push(genre.to_string());
        }
    }
    if out.len() > MAX_GENRES {
        return Err(ValidationError::new(
            "genres",
            format!("List at most {MAX_GENRES} genres"),
        ));
    }
    Ok(out)
}

/// Check an email address.
///
/// A deliberately loose syntactic check: one `@`, a non-empty local part,
/// a dotted domain, no whitespace. Delivery is the real test.
///
/// # Errors
///
/// Returns a [`ValidationError`] on `field`.
pub fn email(field: &'static str, value: &str) -> Result<String> {
    let email = value.trim();
    let invalid = || ValidationError::new(field, "Enter a valid email address");

    if email.is_empty() || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }
    Ok(email.to_string())
}

/// Parse a decimal amount such as `250` or `250.50` into cents.
///
/// # Errors
///
/// Returns a [`ValidationError`] on `field` for malformed or negative input.
pub fn amount_cents(field: &'static str, value: &str) -> Result<Option<i64>> {
    let value = value.trim().trim_start_matches(['$', '€', '£']);
    if value.is_empty() {
        return Ok(None);
    }
    let invalid = || ValidationError::new(field, "Enter an amount like 250 or 250.50");

    let (major, minor) = value.split_once('.').unwrap_or((value, ""));
    if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if minor.len() > 2 || !minor.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let major: i64 = major.parse().map_err(|_| invalid())?;
    let minor: i64 = if minor.is_empty() {
        0
    } else {
        format!("{minor:0<2}").parse().map_err(|_| invalid())?
    };
    major
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(minor))
        .map(Some)
        .ok_or_else(invalid)
}

// ============================================================================
// Profile form
// ============================================================================

/// Raw `/dashboard/profile` form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    /// Requested slug; derived from the display name when blank.
    #[serde(default)]
    pub slug: String,
    /// Stage name.
    #[serde(default)]
    pub display_name: String,
    /// Home city.
    #[serde(default)]
    pub city: String,
    /// Comma-separated genres.
    #[serde(default)]
    pub genres: String,
    /// Bio.
    #[serde(default)]
    pub bio: String,
    /// Starting rate, e.g. `250`.
    #[serde(default)]
    pub rate_from: String,
    /// Notification address.
    #[serde(default)]
    pub contact_email: String,
}

/// Checked profile fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFields {
    /// Normalized slug.
    pub slug: String,
    /// Stage name.
    pub display_name: String,
    /// Home city.
    pub city: String,
    /// Genres.
    pub genres: Vec<String>,
    /// Bio.
    pub bio: String,
    /// Starting rate in cents.
    pub rate_from_cents: Option<i64>,
    /// Notification address, possibly empty on drafts.
    pub contact_email: String,
}

impl ProfileInput {
    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns the first failing field.
    pub fn validate(&self) -> Result<ProfileFields> {
        let display_name = text("display_name", "Display name", &self.display_name, 1, 80)?;
        let slug_source = if self.slug.trim().is_empty() {
            slugify(&display_name)
        } else {
            self.slug.clone()
        };
        let contact_email = if self.contact_email.trim().is_empty() {
            String::new()
        } else {
            email("contact_email", &self.contact_email)?
        };

        Ok(ProfileFields {
            slug: slug(&slug_source)?,
            city: text("city", "City", &self.city, 0, 80)?,
            genres: genres(&self.genres)?,
            bio: text("bio", "Bio", &self.bio, 0, 2000)?,
            rate_from_cents: amount_cents("rate_from", &self.rate_from)?,
            display_name,
            contact_email,
        })
    }
}

// ============================================================================
// Booking form
// ============================================================================

/// Raw `/dj/{slug}/book` form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingInput {
    /// Client name.
    #[serde(default)]
    pub client_name: String,
    /// Client email.
    #[serde(default)]
    pub client_email: String,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub event_date: String,
    /// Kind of event.
    #[serde(default)]
    pub event_type: String,
    /// Venue.
    #[serde(default)]
    pub venue: String,
    /// Expected guests, optional.
    #[serde(default)]
    pub guest_count: String,
    /// Message to the DJ.
    #[serde(default)]
    pub message: String,
}

/// Checked booking fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingFields {
    /// Client name.
    pub client_name: String,
    /// Client email.
    pub client_email: String,
    /// Gig date, today or later.
    pub event_date: NaiveDate,
    /// Kind of event.
    pub event_type: String,
    /// Venue.
    pub venue: String,
    /// Expected guests.
    pub guest_count: Option<i32>,
    /// Message to the DJ.
    pub message: String,
}

impl BookingInput {
    /// Validate every field; `today` is the earliest acceptable event date.
    ///
    /// # Errors
    ///
    /// Returns the first failing field.
    pub fn validate(&self, today: NaiveDate) -> Result<BookingFields> {
        let client_name = text("client_name", "Name", &self.client_name, 1, 80)?;
        let client_email = email("client_email", &self.client_email)?;

        let event_date = NaiveDate::parse_from_str(self.event_date.trim(), "%Y-%m-%d")
            .map_err(|_| ValidationError::new("event_date", "Pick the date of your event"))?;
        if event_date < today {
            return Err(ValidationError::new(
                "event_date",
                "The event date is in the past",
            ));
        }

        let guest_count = match self.guest_count.trim() {
            "" => None,
            raw => {
                let count: i32 = raw.parse().map_err(|_| {
                    ValidationError::new("guest_count", "Guest count must be a number")
                })?;
                if !(1..=100_000).contains(&count) {
                    return Err(ValidationError::new(
                        "guest_count",
                        "Guest count must be between 1 and 100000",
                    ));
                }
                Some(count)
            },
        };

        Ok(BookingFields {
            client_name,
            client_email,
            event_date,
            event_type: text("event_type", "Event type", &self.event_type, 0, 80)?,
            venue: text("venue", "Venue", &self.venue, 0, 160)?,
            guest_count,
            message: text("message", "Message", &self.message, 0, 2000)?,
        })
    }
}
