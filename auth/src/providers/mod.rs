//! The hosted auth service, behind a trait.
//!
//! Gigbook never stores passwords or mints tokens. Every credential check is
//! delegated to an [`AuthProvider`]; production uses [`HostedAuthClient`],
//! tests use `mocks::MockAuthProvider`.

mod hosted;

pub use hosted::HostedAuthClient;

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

/// A signed-in auth user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    /// Auth user id (JWT `sub`).
    pub id: Uuid,
    /// Primary email, if the account has one.
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens issued for a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthSession {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Long-lived token exchanged for a new session.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Who the tokens belong to.
    pub user: AuthUser,
}

/// Result of a sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Email confirmation is disabled; the user is signed in.
    SignedIn(AuthSession),
    /// A confirmation email was sent.
    ConfirmationSent,
}

/// The `type` query parameter of an email link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpType {
    /// Sign-up confirmation.
    Signup,
    /// Passwordless sign-in link.
    MagicLink,
    /// Generic email OTP.
    Email,
    /// Password recovery.
    Recovery,
    /// Invitation.
    Invite,
    /// Email address change.
    EmailChange,
}

impl OtpType {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::MagicLink => "magiclink",
            Self::Email => "email",
            Self::Recovery => "recovery",
            Self::Invite => "invite",
            Self::EmailChange => "email_change",
        }
    }
}

impl FromStr for OtpType {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "signup" => Ok(Self::Signup),
            "magiclink" => Ok(Self::MagicLink),
            "email" => Ok(Self::Email),
            "recovery" => Ok(Self::Recovery),
            "invite" => Ok(Self::Invite),
            "email_change" => Ok(Self::EmailChange),
            other => Err(AuthError::UnsupportedOtpType(other.to_string())),
        }
    }
}

/// Operations Gigbook needs from the hosted auth service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange email and password for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Create an account. Confirmation links point at `redirect_to`.
    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str)
        -> Result<SignUpOutcome>;

    /// Email a passwordless sign-in link pointing at `redirect_to`.
    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<()>;

    /// Verify the `token_hash` from an email link and start a session.
    async fn verify_otp(&self, token_hash: &str, otp_type: OtpType) -> Result<AuthSession>;

    /// Validate an access token and return its user.
    async fn get_user(&self, access_token: &str) -> Result<AuthUser>;

    /// Trade a refresh token for a fresh session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession>;

    /// Revoke the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}
