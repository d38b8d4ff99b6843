//! Data access.
//!
//! Every call names the [`Actor`] it runs as, so the database's row-level
//! security decides what the caller may see and change. Handlers pass the
//! signed-in user (or [`Actor::Anonymous`]); only payment webhooks and
//! lookups already authorized by a client token use [`Actor::Service`].

mod memory;
mod postgres;

pub use memory::MemoryDatabase;
pub use postgres::PostgresDatabase;

use crate::types::{BookingRequest, BookingStatus, DirectoryFilter, Profile, WaitlistEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigbook_postgres::{Actor, DbError};
use thiserror::Error;
use uuid::Uuid;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A uniqueness or compare-and-set check failed.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The row does not exist or the actor may not see it.
    #[error("Not found")]
    NotFound,

    /// The database failed.
    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let Some(db) = error.as_database_error() {
            if db.is_unique_violation() {
                return Self::Conflict(db.message().to_string());
            }
        }
        Self::Database(DbError::Query(error))
    }
}

/// Result alias for repository calls.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// DJ profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Published profiles matching `filter`, newest first.
    async fn list_published(&self, actor: &Actor, filter: &DirectoryFilter) -> RepoResult<Vec<Profile>>;

    /// Profile at `/dj/{slug}`, if visible to `actor`.
    async fn find_by_slug(&self, actor: &Actor, slug: &str) -> RepoResult<Option<Profile>>;

    /// Profile by id, if visible to `actor`.
    async fn find_by_id(&self, actor: &Actor, id: Uuid) -> RepoResult<Option<Profile>>;

    /// The profile owned by `user_id`, if visible to `actor`.
    async fn find_by_user(&self, actor: &Actor, user_id: Uuid) -> RepoResult<Option<Profile>>;

    /// Whether another user already holds `slug`.
    async fn slug_taken(&self, actor: &Actor, slug: &str, owner: Uuid) -> RepoResult<bool>;

    /// Insert or update the owner's profile.
    ///
    /// A slug clash surfaces as [`RepositoryError::Conflict`].
    async fn save(&self, actor: &Actor, profile: &Profile) -> RepoResult<()>;
}

/// Booking requests.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Store a new request. The id and client token are generated by the
    /// caller; nothing is read back.
    async fn insert(&self, actor: &Actor, booking: &BookingRequest) -> RepoResult<()>;

    /// Request by id, if visible to `actor` (the owning DJ, or service).
    async fn find(&self, actor: &Actor, id: Uuid) -> RepoResult<Option<BookingRequest>>;

    /// Request by id and client token. The token is the credential.
    async fn find_for_client(&self, actor: &Actor, id: Uuid, token: &str)
        -> RepoResult<Option<BookingRequest>>;

    /// Requests for a profile, newest first.
    async fn list_for_profile(&self, actor: &Actor, profile_id: Uuid) -> RepoResult<Vec<BookingRequest>>;

    /// Write status, deposit amount and decline reason, but only if the row
    /// is still in `expected`.
    ///
    /// Returns [`RepositoryError::Conflict`] when another request got there
    /// first.
    async fn update_status(
        &self,
        actor: &Actor,
        booking: &BookingRequest,
        expected: BookingStatus,
    ) -> RepoResult<()>;

    /// Remember the checkout session opened by the client.
    ///
    /// Returns [`RepositoryError::Conflict`] if the booking is no longer
    /// awaiting a deposit.
    async fn record_checkout(&self, actor: &Actor, id: Uuid, token: &str, session_id: &str)
        -> RepoResult<()>;

    /// Mark the deposit paid. Returns `false` if it already was.
    async fn record_deposit(
        &self,
        actor: &Actor,
        id: Uuid,
        payment_intent_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> RepoResult<bool>;
}

/// Pre-launch waitlist.
#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    /// Add an entry. Returns `false` if the email was already on the list.
    async fn join(&self, actor: &Actor, entry: &WaitlistEntry) -> RepoResult<bool>;
}
