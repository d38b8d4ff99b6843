//! In-memory auth provider for tests.

use crate::error::{AuthError, Result};
use crate::providers::{AuthProvider, AuthSession, AuthUser, OtpType, SignUpOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Account {
    id: Uuid,
    email: String,
    password: String,
    confirmed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    access_tokens: HashMap<String, AuthUser>,
    refresh_tokens: HashMap<String, AuthUser>,
    pending_links: HashMap<String, String>,
    sent_links: Vec<(String, String)>,
    signed_out: Vec<String>,
}

/// Mock auth provider.
///
/// Accounts, sessions and email links live in memory. Clones share state, so
/// a test can keep a handle while the router owns another.
#[derive(Debug, Clone, Default)]
pub struct MockAuthProvider {
    inner: Arc<Mutex<Inner>>,
    require_confirmation: bool,
    unavailable: bool,
    sign_out_fails: bool,
}

impl MockAuthProvider {
    /// Create a new mock where sign-up signs the user straight in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign-up sends a confirmation link instead of signing in.
    #[must_use]
    pub const fn requiring_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// Every call fails as if the service were down.
    #[must_use]
    pub const fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// `sign_out` records the call, then fails.
    #[must_use]
    pub const fn failing_sign_out(mut self) -> Self {
        self.sign_out_fails = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            Err(AuthError::Network("mock auth service unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Register a confirmed account and return its id.
    pub fn add_user(&self, email: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().accounts.insert(
            email.to_lowercase(),
            Account {
                id,
                email: email.to_string(),
                password: password.to_string(),
                confirmed: true,
            },
        );
        id
    }

    /// Issue a session for an existing account, or a fresh user id when the
    /// email is unknown.
    pub fn session_for(&self, email: &str) -> AuthSession {
        let mut inner = self.lock();
        let id = inner
            .accounts
            .get(&email.to_lowercase())
            .map_or_else(Uuid::new_v4, |account| account.id);
        issue(&mut inner, AuthUser {
            id,
            email: Some(email.to_string()),
        })
    }

    /// Invalidate an access token, as if it had expired.
    pub fn expire_access_token(&self, access_token: &str) {
        self.lock().access_tokens.remove(access_token);
    }

    /// Token hash of the last email link sent to `email`.
    #[must_use]
    pub fn last_link_token(&self, email: &str) -> Option<String> {
        let inner = self.lock();
        inner
            .pending_links
            .iter()
            .find(|(_, to)| to.eq_ignore_ascii_case(email))
            .map(|(hash, _)| hash.clone())
    }

    /// `(email, redirect_to)` of every link sent.
    #[must_use]
    pub fn sent_links(&self) -> Vec<(String, String)> {
        self.lock().sent_links.clone()
    }

    /// Access tokens passed to `sign_out`.
    #[must_use]
    pub fn signed_out(&self) -> Vec<String> {
        self.lock().signed_out.clone()
    }
}

fn issue(inner: &mut Inner, user: AuthUser) -> AuthSession {
    let session = AuthSession {
        access_token: format!("access-{}", Uuid::new_v4().simple()),
        refresh_token: format!("refresh-{}", Uuid::new_v4().simple()),
        expires_in: 3600,
        user,
    };
    inner
        .access_tokens
        .insert(session.access_token.clone(), session.user.clone());
    inner
        .refresh_tokens
        .insert(session.refresh_token.clone(), session.user.clone());
    session
}

fn send_link(inner: &mut Inner, email: &str, redirect_to: &str) {
    inner
        .pending_links
        .insert(format!("hash-{}", Uuid::new_v4().simple()), email.to_string());
    inner
        .sent_links
        .push((email.to_string(), redirect_to.to_string()));
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.check_available()?;
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get(&email.to_lowercase())
            .filter(|account| account.password == password)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;
        if !account.confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }
        Ok(issue(&mut inner, AuthUser {
            id: account.id,
            email: Some(account.email),
        }))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
    ) -> Result<SignUpOutcome> {
        self.check_available()?;
        if password.len() < 6 {
            return Err(AuthError::WeakPassword(
                "Password should be at least 6 characters".to_string(),
            ));
        }

        let mut inner = self.lock();
        let key = email.to_lowercase();
        if inner.accounts.contains_key(&key) {
            return Err(AuthError::UserAlreadyExists);
        }

        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password: password.to_string(),
            confirmed: !self.require_confirmation,
        };
        inner.accounts.insert(key, account.clone());

        if self.require_confirmation {
            send_link(&mut inner, email, redirect_to);
            Ok(SignUpOutcome::ConfirmationSent)
        } else {
            Ok(SignUpOutcome::SignedIn(issue(&mut inner, AuthUser {
                id: account.id,
                email: Some(account.email),
            })))
        }
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<()> {
        self.check_available()?;
        let mut inner = self.lock();
        let key = email.to_lowercase();
        inner.accounts.entry(key).or_insert_with(|| Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password: String::new(),
            confirmed: false,
        });
        send_link(&mut inner, email, redirect_to);
        Ok(())
    }

    async fn verify_otp(&self, token_hash: &str, _otp_type: OtpType) -> Result<AuthSession> {
        self.check_available()?;
        let mut inner = self.lock();
        let email = inner
            .pending_links
            .remove(token_hash)
            .ok_or(AuthError::LinkExpired)?;
        let account = inner
            .accounts
            .get_mut(&email.to_lowercase())
            .ok_or(AuthError::LinkExpired)?;
        account.confirmed = true;
        let user = AuthUser {
            id: account.id,
            email: Some(account.email.clone()),
        };
        Ok(issue(&mut inner, user))
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        self.check_available()?;
        self.lock()
            .access_tokens
            .get(access_token)
            .cloned()
            .ok_or(AuthError::SessionExpired)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        self.check_available()?;
        let mut inner = self.lock();
        let user = inner
            .refresh_tokens
            .remove(refresh_token)
            .ok_or(AuthError::InvalidRefreshToken)?;
        Ok(issue(&mut inner, user))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.check_available()?;
        let mut inner = self.lock();
        if let Some(user) = inner.access_tokens.remove(access_token) {
            inner.refresh_tokens.retain(|_, owner| owner.id != user.id);
        }
        inner.signed_out.push(access_token.to_string());
        if self.sign_out_fails {
            return Err(AuthError::Network("mock sign-out failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_round_trip() {
        let auth = MockAuthProvider::new();
        let id = auth.add_user("DJ@example.com", "secret-pass");

        let session = auth.sign_in_with_password("dj@example.com", "secret-pass").await.unwrap();
        assert_eq!(session.user.id, id);
        assert_eq!(auth.get_user(&session.access_token).await.unwrap().id, id);

        let err = auth.sign_in_with_password("dj@example.com", "nope").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let auth = MockAuthProvider::new();
        let session = auth.session_for("dj@example.com");

        let refreshed = auth.refresh_session(&session.refresh_token).await.unwrap();
        assert_ne!(refreshed.access_token, session.access_token);
        assert_eq!(
            auth.refresh_session(&session.refresh_token).await.unwrap_err(),
            AuthError::InvalidRefreshToken
        );
    }

    #[tokio::test]
    async fn magic_link_is_single_use() {
        let auth = MockAuthProvider::new();
        auth.send_magic_link("new@example.com", "https://gigbook.test/auth/confirm").await.unwrap();
        let hash = auth.last_link_token("new@example.com").unwrap();

        auth.verify_otp(&hash, OtpType::MagicLink).await.unwrap();
        assert_eq!(
            auth.verify_otp(&hash, OtpType::MagicLink).await.unwrap_err(),
            AuthError::LinkExpired
        );
    }

    #[tokio::test]
    async fn confirmation_required_blocks_password_sign_in() {
        let auth = MockAuthProvider::new().requiring_confirmation();
        let outcome = auth.sign_up("new@example.com", "long-password", "/auth/confirm").await.unwrap();
        assert_eq!(outcome, SignUpOutcome::ConfirmationSent);
        assert_eq!(
            auth.sign_in_with_password("new@example.com", "long-password").await.unwrap_err(),
            AuthError::EmailNotConfirmed
        );
    }

    #[tokio::test]
    async fn failing_sign_out_still_records_the_call() {
        let auth = MockAuthProvider::new().failing_sign_out();
        let session = auth.session_for("dj@example.com");
        assert!(matches!(
            auth.sign_out(&session.access_token).await,
            Err(AuthError::Network(_))
        ));
        assert_eq!(auth.signed_out(), vec![session.access_token]);
    }

    #[tokio::test]
    async fn unavailable_fails_everything() {
        let auth = MockAuthProvider::new().unavailable();
        assert!(matches!(auth.get_user("x").await, Err(AuthError::Network(_))));
    }
}
