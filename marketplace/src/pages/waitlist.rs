//! Pre-launch waitlist signup.

use crate::notifications;
use crate::server::AppState;
use crate::types::{WaitlistEntry, WaitlistRole};
use crate::validation::{self, ValidationError};
use axum::extract::State;
use axum::response::Redirect;
use axum::Form;
use gigbook_postgres::Actor;
use gigbook_web::{flash, WebResult};
use serde::Deserialize;
use uuid::Uuid;

/// Raw waitlist form from the home page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitlistForm {
    /// Contact address.
    #[serde(default)]
    pub email: String,
    /// `dj` or `client`.
    #[serde(default)]
    pub role: String,
    /// Optional home city.
    #[serde(default)]
    pub city: String,
}

impl WaitlistForm {
    /// Check the form and build an entry stamped `now`.
    ///
    /// # Errors
    ///
    /// Returns the first failing field.
    pub fn validate(&self, now: chrono::DateTime<chrono::Utc>) -> Result<WaitlistEntry, ValidationError> {
        let email = validation::email("email", &self.email)?.to_ascii_lowercase();
        let role: WaitlistRole = self
            .role
            .parse()
            .map_err(|_| ValidationError::new("role", "Tell us whether you're a DJ or looking to book one"))?;
        let city = validation::text("city", "City", &self.city, 0, 80)?;

        Ok(WaitlistEntry {
            id: Uuid::new_v4(),
            email,
            role,
            city: Some(city).filter(|c| !c.is_empty()),
            created_at: now,
        })
    }
}

/// `POST /waitlist`
///
/// Joining twice is not an error; only new entries get the welcome email.
pub async fn join(State(state): State<AppState>, Form(form): Form<WaitlistForm>) -> WebResult<Redirect> {
    let entry = match form.validate(state.services.clock.now()) {
        Ok(entry) => entry,
        Err(error) => return Ok(flash::error("/", &error.message)),
    };

    let added = state.services.waitlist.join(&Actor::Anonymous, &entry).await?;
    if !added {
        tracing::debug!(role = entry.role.as_str(), "Waitlist: already listed");
        return Ok(flash::message("/", "You're already on the list. We'll be in touch!"));
    }

    tracing::info!(role = entry.role.as_str(), "Waitlist: joined");
    metrics::counter!("waitlist.joined", "role" => entry.role.as_str()).increment(1);

    let email = notifications::waitlist_welcome(&entry, &state.settings.links);
    if let Err(error) = state.services.mailer.send(&email).await {
        tracing::warn!(%error, "Waitlist welcome email failed");
    }

    Ok(flash::message("/", "You're on the list! Check your inbox."))
}
