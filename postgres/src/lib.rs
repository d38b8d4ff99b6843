//! `PostgreSQL` access for Gigbook.
//!
//! The hosted database enforces row-level security. Every query Gigbook runs
//! on behalf of a person goes through a transaction opened with
//! [`begin_as`], which switches to the database role for that [`Actor`] and
//! publishes the JWT claims the RLS policies read:
//!
//! ```sql
//! select set_config('role', 'authenticated', true),
//!        set_config('request.jwt.claims', '{"sub":"…","role":"authenticated"}', true);
//! ```
//!
//! Both settings are transaction-local, so a pooled connection never leaks
//! one caller's identity to the next.
//!
//! # Example
//!
//! ```ignore
//! use gigbook_postgres::{begin_as, Actor};
//!
//! let mut tx = begin_as(&pool, &Actor::user(user_id, None)).await?;
//! let rows = sqlx::query_as::<_, ProfileRow>("select * from profiles where user_id = $1")
//!     .bind(user_id)
//!     .fetch_all(&mut *tx)
//!     .await?;
//! tx.commit().await?;
//! ```

use serde_json::json;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// Database errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Could not establish the pool.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// Could not open or scope a transaction.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// A query failed.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connection string.
    pub url: String,
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// How long `acquire` waits for a free connection.
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Settings with the defaults used by the server binary.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Override the connection limit.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Override the acquire timeout.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`DbError::Connect`] if the database is unreachable or the URL is
/// invalid.
pub async fn connect(config: &PoolConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| DbError::Connect(e.to_string()))?;

    tracing::info!(max_connections = config.max_connections, "Database pool ready");
    Ok(pool)
}

/// Apply the reference schema in `migrations/` (local development only; the
/// hosted database is migrated by its own tooling).
///
/// # Errors
///
/// Returns [`DbError::Migration`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::Migration(e.to_string()))
}

/// Readiness probe.
///
/// # Errors
///
/// Returns [`DbError::Query`] if the database does not answer.
pub async fn ping(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("select 1").execute(pool).await?;
    Ok(())
}

/// Who a query runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// Signed-out visitor. Sees published profiles; may insert booking
    /// requests and waitlist entries.
    Anonymous,

    /// Signed-in auth user.
    User {
        /// Auth user id (`sub` claim).
        id: Uuid,
        /// Email claim, when known.
        email: Option<String>,
    },

    /// Server-side jobs that act for nobody in particular (payment webhooks).
    /// Runs with the connection's own role and no claims.
    Service,
}

impl Actor {
    /// Signed-in user.
    #[must_use]
    pub const fn user(id: Uuid, email: Option<String>) -> Self {
        Self::User { id, email }
    }

    /// The auth user id, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User { id, .. } => Some(*id),
            Self::Anonymous | Self::Service => None,
        }
    }

    /// Database role the transaction switches to; `None` keeps the
    /// connection's role.
    #[must_use]
    pub const fn role(&self) -> Option<&'static str> {
        match self {
            Self::Anonymous => Some("anon"),
            Self::User { .. } => Some("authenticated"),
            Self::Service => None,
        }
    }

    /// JSON published as `request.jwt.claims`.
    #[must_use]
    pub fn claims(&self) -> String {
        match self {
            Self::Anonymous => json!({ "role": "anon" }).to_string(),
            Self::User { id, email } => json!({
                "sub": id,
                "role": "authenticated",
                "email": email,
            })
            .to_string(),
            Self::Service => json!({ "role": "service_role" }).to_string(),
        }
    }
}

/// Begin a transaction scoped to `actor`.
///
/// # Errors
///
/// Returns [`DbError::Transaction`] if the transaction cannot be opened or
/// the role cannot be assumed.
pub async fn begin_as(
    pool: &PgPool,
    actor: &Actor,
) -> Result<Transaction<'static, Postgres>, DbError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::Transaction(format!("Failed to start transaction: {e}")))?;

    if let Some(role) = actor.role() {
        sqlx::query("select set_config('role', $1, true), set_config('request.jwt.claims', $2, true)")
            .bind(role)
            .bind(actor.claims())
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to assume role {role}: {e}")))?;
    }

    Ok(tx)
}
