//! # Gigbook Auth
//!
//! Session handling on top of a hosted auth service.
//!
//! Credentials never touch Gigbook. Sign-in, sign-up, email links and token
//! refresh go through an [`AuthProvider`]; this crate stores the resulting
//! tokens in `HttpOnly` cookies and turns them back into a user on every
//! request.
//!
//! ## Wiring
//!
//! ```rust,ignore
//! use axum::{middleware, Router};
//! use gigbook_auth::{resolve_session, SessionState};
//!
//! let sessions = SessionState::new(provider, CookieConfig::new(true));
//! let app = Router::new()
//!     .route("/dashboard", get(dashboard))
//!     .layer(middleware::from_fn_with_state(sessions, resolve_session));
//!
//! async fn dashboard(CurrentUser(user): CurrentUser) -> String {
//!     format!("hello {}", user.id)
//! }
//! ```

pub mod config;
pub mod cookies;
pub mod error;
pub mod providers;
pub mod redirect;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::{AuthConfig, CookieConfig};
pub use error::{AuthError, Result};
pub use providers::{AuthProvider, AuthSession, AuthUser, HostedAuthClient, OtpType, SignUpOutcome};
pub use redirect::sanitize_next;
pub use session::{resolve_session, CurrentUser, MaybeUser, ResolvedSession, SessionState};
