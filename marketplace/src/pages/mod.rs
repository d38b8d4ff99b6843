//! Server-rendered pages and form handlers.
//!
//! Reads go straight to the repositories under the caller's identity.
//! Mutations load the row, run one command through
//! [`crate::aggregates::execute`] and answer with a flash redirect.

pub mod auth;
pub mod booking;
pub mod dashboard;
pub mod directory;
pub mod profile;
pub mod waitlist;
pub mod webhooks;

use crate::repositories::RepositoryError;
use crate::types::Money;
use askama::Template;
use axum::http::StatusCode;
use axum::response::Html;
use gigbook_auth::AuthUser;
use gigbook_postgres::Actor;
use gigbook_web::{AppError, Flash, WebResult};

/// Layout data shared by every page.
#[derive(Debug, Clone, Default)]
pub struct Chrome {
    /// Signed-in user's email, if any.
    pub user_email: Option<String>,
    /// Whether someone is signed in.
    pub signed_in: bool,
    /// Flash notice.
    pub message: Option<String>,
    /// Flash error.
    pub error: Option<String>,
}

impl Chrome {
    /// Layout data for `user` with the flash from the query string.
    #[must_use]
    pub fn new(user: Option<&AuthUser>, flash: Flash) -> Self {
        Self {
            user_email: user.and_then(|u| u.email.clone()),
            signed_in: user.is_some(),
            message: flash.message.filter(|m| !m.is_empty()),
            error: flash.error.filter(|e| !e.is_empty()),
        }
    }
}

/// Render an askama template into an HTML response.
pub(crate) fn render<T: Template>(template: &T) -> WebResult<Html<String>> {
    template
        .render()
        .map(Html)
        .map_err(|e| AppError::internal("Could not render page").with_source(e))
}

/// Database identity for a signed-in user.
pub(crate) fn actor_for(user: &AuthUser) -> Actor {
    Actor::user(user.id, user.email.clone())
}

/// Format cents in the marketplace currency.
pub(crate) fn money(cents: i64, currency: &str) -> String {
    Money::new(cents, currency).to_string()
}

pub(crate) fn not_found() -> AppError {
    AppError::new(
        StatusCode::NOT_FOUND,
        "We couldn't find that page".to_string(),
        "NOT_FOUND".to_string(),
    )
}

impl From<RepositoryError> for AppError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => not_found(),
            RepositoryError::Conflict(message) => {
                Self::conflict("That was changed in the meantime, please try again")
                    .with_source(anyhow::anyhow!(message))
            },
            RepositoryError::Database(db) => {
                Self::unavailable("Service temporarily unavailable").with_source(db)
            },
        }
    }
}
