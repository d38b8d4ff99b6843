//! Error types for the hosted auth integration.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Everything that can go wrong talking to the hosted auth service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Credentials
    // ═══════════════════════════════════════════════════════════

    /// Email/password pair rejected.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Account exists but the email address has not been confirmed.
    #[error("Email not confirmed")]
    EmailNotConfirmed,

    /// Sign-up for an address that already has an account.
    #[error("User already registered")]
    UserAlreadyExists,

    /// Password rejected by the provider's policy.
    #[error("Weak password: {0}")]
    WeakPassword(String),

    // ═══════════════════════════════════════════════════════════
    // Email links
    // ═══════════════════════════════════════════════════════════

    /// Sign-in or confirmation link is expired or was already used.
    #[error("Email link is invalid or has expired")]
    LinkExpired,

    /// Unknown `type` parameter on a confirmation link.
    #[error("Unsupported verification type: {0}")]
    UnsupportedOtpType(String),

    // ═══════════════════════════════════════════════════════════
    // Sessions
    // ═══════════════════════════════════════════════════════════

    /// Access token rejected.
    #[error("Session has expired")]
    SessionExpired,

    /// Refresh token rejected.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    // ═══════════════════════════════════════════════════════════
    // Provider
    // ═══════════════════════════════════════════════════════════

    /// Provider throttled the request (email sends, sign-in attempts).
    #[error("Too many requests, please try again later")]
    RateLimited,

    /// Provider could not be reached.
    #[error("Auth service unreachable: {0}")]
    Network(String),

    /// Provider answered with an error we do not map.
    #[error("Auth service error ({status}): {message}")]
    Provider {
        /// HTTP status returned.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// Response could not be decoded or a request could not be built.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` if this error is due to invalid user input.
    ///
    /// User errors are shown back on the form; the rest are logged and
    /// replaced with a generic message.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::EmailNotConfirmed
                | Self::UserAlreadyExists
                | Self::WeakPassword(_)
                | Self::LinkExpired
                | Self::UnsupportedOtpType(_)
                | Self::RateLimited
        )
    }

    /// Returns `true` if the stored session can no longer be used.
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::InvalidRefreshToken)
    }

    /// Text safe to show in a flash message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::EmailNotConfirmed => {
                "Please confirm your email address first. Check your inbox.".to_string()
            },
            Self::UserAlreadyExists => "An account with that email already exists".to_string(),
            Self::WeakPassword(reason) => format!("Please choose a stronger password: {reason}"),
            Self::LinkExpired => "That link is invalid or has expired".to_string(),
            Self::UnsupportedOtpType(_) => "That link is not valid".to_string(),
            Self::RateLimited => "Too many attempts, please wait a minute".to_string(),
            Self::SessionExpired | Self::InvalidRefreshToken => {
                "Your session has expired, please sign in again".to_string()
            },
            Self::Network(_) | Self::Provider { .. } | Self::InternalError(_) => {
                "Sign-in is temporarily unavailable".to_string()
            },
        }
    }
}
