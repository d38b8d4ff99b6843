//! Postgres repositories.
//!
//! Each call opens a transaction with [`begin_as`], so the hosted database's
//! row-level-security policies see the caller's role and claims. Inserts
//! never use `RETURNING`: anonymous callers may insert booking requests but
//! not read them back.

use super::{
    BookingRepository, ProfileRepository, RepoResult, RepositoryError, WaitlistRepository,
};
use crate::types::{BookingRequest, BookingStatus, DirectoryFilter, Profile, WaitlistEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigbook_postgres::{begin_as, Actor};
use sqlx::PgPool;
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, user_id, slug, display_name, city, genres, bio, \
     rate_from_cents, contact_email, avatar_url, published, created_at, updated_at";

const BOOKING_COLUMNS: &str = "id, profile_id, client_name, client_email, event_date, \
     event_type, venue, guest_count, message, status, client_token, deposit_cents, \
     deposit_paid, deposit_paid_at, checkout_session_id, payment_intent_id, \
     decline_reason, created_at, updated_at";

/// All three repositories over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Wrap a pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProfileRepository for PostgresDatabase {
    #[tracing::instrument(skip(self, actor))]
    async fn list_published(&self, actor: &Actor, filter: &DirectoryFilter) -> RepoResult<Vec<Profile>> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let profiles = sqlx::query_as::<_, Profile>(&format!(
            "select {PROFILE_COLUMNS} from profiles \
             where published \
               and ($1::text is null or lower(city) = lower($1)) \
               and ($2::text is null or exists (select 1 from unnest(genres) g where lower(g) = lower($2))) \
             order by updated_at desc \
             limit 200"
        ))
        .bind(filter.city.as_deref())
        .bind(filter.genre.as_deref())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(profiles)
    }

    async fn find_by_slug(&self, actor: &Actor, slug: &str) -> RepoResult<Option<Profile>> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "select {PROFILE_COLUMNS} from profiles where slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn find_by_id(&self, actor: &Actor, id: Uuid) -> RepoResult<Option<Profile>> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "select {PROFILE_COLUMNS} from profiles where id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn find_by_user(&self, actor: &Actor, user_id: Uuid) -> RepoResult<Option<Profile>> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "select {PROFILE_COLUMNS} from profiles where user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn slug_taken(&self, actor: &Actor, slug: &str, owner: Uuid) -> RepoResult<bool> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let taken: bool = sqlx::query_scalar(
            "select exists (select 1 from profiles where slug = $1 and user_id <> $2)",
        )
        .bind(slug)
        .bind(owner)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(taken)
    }

    #[tracing::instrument(skip(self, actor, profile), fields(user_id = %profile.user_id))]
    async fn save(&self, actor: &Actor, profile: &Profile) -> RepoResult<()> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let result = sqlx::query(
            "insert into profiles (id, user_id, slug, display_name, city, genres, bio, \
                 rate_from_cents, contact_email, avatar_url, published, created_at, updated_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             on conflict (user_id) do update set \
                 slug = excluded.slug, \
                 display_name = excluded.display_name, \
                 city = excluded.city, \
                 genres = excluded.genres, \
                 bio = excluded.bio, \
                 rate_from_cents = excluded.rate_from_cents, \
                 contact_email = excluded.contact_email, \
                 avatar_url = excluded.avatar_url, \
                 published = excluded.published, \
                 updated_at = excluded.updated_at",
        )
        .bind(profile.id)
        .bind(profile.user_id)
        .bind(&profile.slug)
        .bind(&profile.display_name)
        .bind(&profile.city)
        .bind(&profile.genres)
        .bind(&profile.bio)
        .bind(profile.rate_from_cents)
        .bind(&profile.contact_email)
        .bind(profile.avatar_url.as_deref())
        .bind(profile.published)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for PostgresDatabase {
    #[tracing::instrument(skip(self, actor, booking), fields(booking_id = %booking.id))]
    async fn insert(&self, actor: &Actor, booking: &BookingRequest) -> RepoResult<()> {
        let mut tx = begin_as(&self.pool, actor).await?;
        sqlx::query(
            "insert into booking_requests (id, profile_id, client_name, client_email, event_date, \
                 event_type, venue, guest_count, message, status, client_token, created_at, updated_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(booking.id)
        .bind(booking.profile_id)
        .bind(&booking.client_name)
        .bind(&booking.client_email)
        .bind(booking.event_date)
        .bind(&booking.event_type)
        .bind(&booking.venue)
        .bind(booking.guest_count)
        .bind(&booking.message)
        .bind(booking.status)
        .bind(&booking.client_token)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, actor: &Actor, id: Uuid) -> RepoResult<Option<BookingRequest>> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let booking = sqlx::query_as::<_, BookingRequest>(&format!(
            "select {BOOKING_COLUMNS} from booking_requests where id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(booking)
    }

    async fn find_for_client(
        &self,
        actor: &Actor,
        id: Uuid,
        token: &str,
    ) -> RepoResult<Option<BookingRequest>> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let booking = sqlx::query_as::<_, BookingRequest>(&format!(
            "select {BOOKING_COLUMNS} from client_booking($1, $2)"
        ))
        .bind(id)
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(booking)
    }

    async fn list_for_profile(&self, actor: &Actor, profile_id: Uuid) -> RepoResult<Vec<BookingRequest>> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let bookings = sqlx::query_as::<_, BookingRequest>(&format!(
            "select {BOOKING_COLUMNS} from booking_requests \
             where profile_id = $1 order by created_at desc"
        ))
        .bind(profile_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(bookings)
    }

    #[tracing::instrument(skip(self, actor, booking), fields(booking_id = %booking.id, to = %booking.status))]
    async fn update_status(
        &self,
        actor: &Actor,
        booking: &BookingRequest,
        expected: BookingStatus,
    ) -> RepoResult<()> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let result = sqlx::query(
            "update booking_requests \
                set status = $3, deposit_cents = $4, decline_reason = $5, updated_at = $6 \
              where id = $1 and status = $2",
        )
        .bind(booking.id)
        .bind(expected)
        .bind(booking.status)
        .bind(booking.deposit_cents)
        .bind(booking.decline_reason.as_deref())
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Either gone/invisible or moved on; tell them apart for the message.
            let current: Option<BookingStatus> =
                sqlx::query_scalar("select status from booking_requests where id = $1")
                    .bind(booking.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some(status) => RepositoryError::Conflict(format!(
                    "booking {} is {status}, expected {expected}",
                    booking.id
                )),
                None => RepositoryError::NotFound,
            });
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_checkout(
        &self,
        actor: &Actor,
        id: Uuid,
        token: &str,
        session_id: &str,
    ) -> RepoResult<()> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let recorded: bool = sqlx::query_scalar("select client_record_checkout($1, $2, $3)")
            .bind(id)
            .bind(token)
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        if recorded {
            Ok(())
        } else {
            Err(RepositoryError::Conflict(
                "booking is not awaiting a deposit".into(),
            ))
        }
    }

    #[tracing::instrument(skip(self, actor))]
    async fn record_deposit(
        &self,
        actor: &Actor,
        id: Uuid,
        payment_intent_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let result = sqlx::query(
            "update booking_requests \
                set deposit_paid = true, deposit_paid_at = $2, payment_intent_id = $3, updated_at = $2 \
              where id = $1 and not deposit_paid",
        )
        .bind(id)
        .bind(paid_at)
        .bind(payment_intent_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl WaitlistRepository for PostgresDatabase {
    async fn join(&self, actor: &Actor, entry: &WaitlistEntry) -> RepoResult<bool> {
        let mut tx = begin_as(&self.pool, actor).await?;
        let result = sqlx::query(
            "insert into waitlist_entries (id, email, role, city, created_at) \
             values ($1, $2, $3, $4, $5) on conflict do nothing",
        )
        .bind(entry.id)
        .bind(&entry.email)
        .bind(entry.role)
        .bind(entry.city.as_deref())
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}
