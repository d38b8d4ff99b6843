//! In-memory repositories.
//!
//! Visibility follows the row-level-security policies of the reference
//! schema: published profiles are public, drafts and booking requests are
//! visible to their owner, and [`Actor::Service`] sees everything.

use super::{
    BookingRepository, ProfileRepository, RepoResult, RepositoryError, WaitlistRepository,
};
use crate::types::{BookingRequest, BookingStatus, DirectoryFilter, Profile, WaitlistEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigbook_postgres::Actor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    profiles: Vec<Profile>,
    bookings: Vec<BookingRequest>,
    waitlist: Vec<WaitlistEntry>,
}

impl Tables {
    fn profile_visible(profile: &Profile, actor: &Actor) -> bool {
        matches!(actor, Actor::Service) || profile.published || profile.is_owned_by(actor.user_id())
    }

    fn booking_visible(&self, booking: &BookingRequest, actor: &Actor) -> bool {
        match actor {
            Actor::Service => true,
            Actor::Anonymous => false,
            Actor::User { id, .. } => self
                .profiles
                .iter()
                .any(|p| p.id == booking.profile_id && p.user_id == *id),
        }
    }
}

/// All three repositories over shared in-memory tables.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every waitlist entry.
    #[must_use]
    pub fn waitlist_entries(&self) -> Vec<WaitlistEntry> {
        self.lock().waitlist.clone()
    }

    /// Every booking request, regardless of visibility.
    #[must_use]
    pub fn all_bookings(&self) -> Vec<BookingRequest> {
        self.lock().bookings.clone()
    }
}

#[async_trait]
impl ProfileRepository for MemoryDatabase {
    async fn list_published(&self, _actor: &Actor, filter: &DirectoryFilter) -> RepoResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self
            .lock()
            .profiles
            .iter()
            .filter(|p| p.published && filter.matches(p))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(profiles)
    }

    async fn find_by_slug(&self, actor: &Actor, slug: &str) -> RepoResult<Option<Profile>> {
        Ok(self
            .lock()
            .profiles
            .iter()
            .find(|p| p.slug == slug && Tables::profile_visible(p, actor))
            .cloned())
    }

    async fn find_by_id(&self, actor: &Actor, id: Uuid) -> RepoResult<Option<Profile>> {
        Ok(self
            .lock()
            .profiles
            .iter()
            .find(|p| p.id == id && Tables::profile_visible(p, actor))
            .cloned())
    }

    async fn find_by_user(&self, actor: &Actor, user_id: Uuid) -> RepoResult<Option<Profile>> {
        Ok(self
            .lock()
            .profiles
            .iter()
            .find(|p| p.user_id == user_id && Tables::profile_visible(p, actor))
            .cloned())
    }

    async fn slug_taken(&self, _actor: &Actor, slug: &str, owner: Uuid) -> RepoResult<bool> {
        Ok(self
            .lock()
            .profiles
            .iter()
            .any(|p| p.slug == slug && p.user_id != owner))
    }

    async fn save(&self, actor: &Actor, profile: &Profile) -> RepoResult<()> {
        if !matches!(actor, Actor::Service) && !profile.is_owned_by(actor.user_id()) {
            return Err(RepositoryError::NotFound);
        }
        let mut tables = self.lock();
        if tables
            .profiles
            .iter()
            .any(|p| p.slug == profile.slug && p.user_id != profile.user_id)
        {
            return Err(RepositoryError::Conflict(
                "duplicate key value violates unique constraint \"profiles_slug_key\"".into(),
            ));
        }
        match tables.profiles.iter_mut().find(|p| p.user_id == profile.user_id) {
            Some(existing) => *existing = profile.clone(),
            None => tables.profiles.push(profile.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for MemoryDatabase {
    async fn insert(&self, _actor: &Actor, booking: &BookingRequest) -> RepoResult<()> {
        let mut tables = self.lock();
        let published = tables
            .profiles
            .iter()
            .any(|p| p.id == booking.profile_id && p.published);
        if !published {
            return Err(RepositoryError::NotFound);
        }
        tables.bookings.push(booking.clone());
        Ok(())
    }

    async fn find(&self, actor: &Actor, id: Uuid) -> RepoResult<Option<BookingRequest>> {
        let tables = self.lock();
        Ok(tables
            .bookings
            .iter()
            .find(|b| b.id == id && tables.booking_visible(b, actor))
            .cloned())
    }

    async fn find_for_client(
        &self,
        _actor: &Actor,
        id: Uuid,
        token: &str,
    ) -> RepoResult<Option<BookingRequest>> {
        Ok(self
            .lock()
            .bookings
            .iter()
            .find(|b| b.id == id && b.client_token == token)
            .cloned())
    }

    async fn list_for_profile(&self, actor: &Actor, profile_id: Uuid) -> RepoResult<Vec<BookingRequest>> {
        let tables = self.lock();
        let mut bookings: Vec<BookingRequest> = tables
            .bookings
            .iter()
            .filter(|b| b.profile_id == profile_id && tables.booking_visible(b, actor))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn update_status(
        &self,
        actor: &Actor,
        booking: &BookingRequest,
        expected: BookingStatus,
    ) -> RepoResult<()> {
        let mut tables = self.lock();
        let visible = tables
            .bookings
            .iter()
            .find(|b| b.id == booking.id)
            .is_some_and(|b| tables.booking_visible(b, actor));
        if !visible {
            return Err(RepositoryError::NotFound);
        }
        let row = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == booking.id)
            .ok_or(RepositoryError::NotFound)?;
        if row.status != expected {
            return Err(RepositoryError::Conflict(format!(
                "booking {} is {}, expected {expected}",
                row.id, row.status
            )));
        }
        row.status = booking.status;
        row.deposit_cents = booking.deposit_cents;
        row.decline_reason.clone_from(&booking.decline_reason);
        row.updated_at = booking.updated_at;
        Ok(())
    }

    async fn record_checkout(
        &self,
        _actor: &Actor,
        id: Uuid,
        token: &str,
        session_id: &str,
    ) -> RepoResult<()> {
        let mut tables = self.lock();
        let row = tables
            .bookings
            .iter_mut()
            .find(|b| {
                b.id == id
                    && b.client_token == token
                    && b.status == BookingStatus::Accepted
                    && !b.deposit_paid
            })
            .ok_or_else(|| RepositoryError::Conflict("booking is not awaiting a deposit".into()))?;
        row.checkout_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn record_deposit(
        &self,
        _actor: &Actor,
        id: Uuid,
        payment_intent_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let mut tables = self.lock();
        let row = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(RepositoryError::NotFound)?;
        if row.deposit_paid {
            return Ok(false);
        }
        row.deposit_paid = true;
        row.deposit_paid_at = Some(paid_at);
        row.payment_intent_id = payment_intent_id.map(ToString::to_string);
        row.updated_at = paid_at;
        Ok(true)
    }
}

#[async_trait]
impl WaitlistRepository for MemoryDatabase {
    async fn join(&self, _actor: &Actor, entry: &WaitlistEntry) -> RepoResult<bool> {
        let mut tables = self.lock();
        if tables
            .waitlist
            .iter()
            .any(|e| e.email.eq_ignore_ascii_case(&entry.email))
        {
            return Ok(false);
        }
        tables.waitlist.push(entry.clone());
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::types::WaitlistRole;
    use chrono::NaiveDate;

    fn profile(user_id: Uuid, slug: &str, published: bool) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            user_id,
            slug: slug.into(),
            display_name: "DJ".into(),
            city: "Berlin".into(),
            genres: vec!["House".into()],
            bio: String::new(),
            rate_from_cents: None,
            contact_email: "dj@example.com".into(),
            avatar_url: None,
            published,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn booking(profile_id: Uuid) -> BookingRequest {
        BookingRequest {
            id: Uuid::new_v4(),
            profile_id,
            client_name: "Sam".into(),
            client_email: "sam@example.com".into(),
            event_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            event_type: String::new(),
            venue: String::new(),
            guest_count: None,
            message: String::new(),
            status: BookingStatus::New,
            client_token: "tok".into(),
            deposit_cents: None,
            deposit_paid: false,
            deposit_paid_at: None,
            checkout_session_id: None,
            payment_intent_id: None,
            decline_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drafts_are_visible_to_owner_only() {
        let db = MemoryDatabase::new();
        let owner = Uuid::new_v4();
        let draft = profile(owner, "dj-draft", false);
        db.save(&Actor::user(owner, None), &draft).await.unwrap();

        assert!(db.find_by_slug(&Actor::Anonymous, "dj-draft").await.unwrap().is_none());
        assert!(db
            .find_by_slug(&Actor::user(Uuid::new_v4(), None), "dj-draft")
            .await
            .unwrap()
            .is_none());
        assert!(db.find_by_slug(&Actor::user(owner, None), "dj-draft").await.unwrap().is_some());
        assert!(db
            .list_published(&Actor::Anonymous, &DirectoryFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn slug_clash_is_a_conflict() {
        let db = MemoryDatabase::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        db.save(&Actor::user(a, None), &profile(a, "nova", true)).await.unwrap();

        assert!(db.slug_taken(&Actor::Service, "nova", b).await.unwrap());
        assert!(!db.slug_taken(&Actor::Service, "nova", a).await.unwrap());
        assert!(matches!(
            db.save(&Actor::user(b, None), &profile(b, "nova", false)).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let db = MemoryDatabase::new();
        let owner = Uuid::new_v4();
        let dj = profile(owner, "nova", true);
        db.save(&Actor::user(owner, None), &dj).await.unwrap();
        let mut request = booking(dj.id);
        db.insert(&Actor::Anonymous, &request).await.unwrap();

        let actor = Actor::user(owner, None);
        request.status = BookingStatus::Accepted;
        db.update_status(&actor, &request, BookingStatus::New).await.unwrap();

        request.status = BookingStatus::Declined;
        assert!(matches!(
            db.update_status(&actor, &request, BookingStatus::New).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(matches!(
            db.update_status(&Actor::user(Uuid::new_v4(), None), &request, BookingStatus::Accepted)
                .await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deposit_is_recorded_once() {
        let db = MemoryDatabase::new();
        let owner = Uuid::new_v4();
        let dj = profile(owner, "nova", true);
        db.save(&Actor::Service, &dj).await.unwrap();
        let request = booking(dj.id);
        db.insert(&Actor::Anonymous, &request).await.unwrap();

        assert!(db.record_deposit(&Actor::Service, request.id, Some("pi_1"), Utc::now()).await.unwrap());
        assert!(!db.record_deposit(&Actor::Service, request.id, Some("pi_1"), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn waitlist_ignores_duplicate_email_case() {
        let db = MemoryDatabase::new();
        let entry = |email: &str| WaitlistEntry {
            id: Uuid::new_v4(),
            email: email.into(),
            role: WaitlistRole::Dj,
            city: None,
            created_at: Utc::now(),
        };
        assert!(db.join(&Actor::Anonymous, &entry("a@b.co")).await.unwrap());
        assert!(!db.join(&Actor::Anonymous, &entry("A@B.CO")).await.unwrap());
        assert_eq!(db.waitlist_entries().len(), 1);
    }
}
