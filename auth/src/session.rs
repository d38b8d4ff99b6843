//! Request-scoped session resolution.
//!
//! [`resolve_session`] runs on every request. It validates the access-token
//! cookie, refreshes the session when the access token has expired, and
//! stores the result as a [`ResolvedSession`] request extension. Handlers
//! read it back with the [`CurrentUser`] and [`MaybeUser`] extractors.

use crate::config::CookieConfig;
use crate::cookies::{
    append_cookies, cleared_cookies, read_cookie, session_cookies, sets_session_cookie,
    ACCESS_COOKIE, REFRESH_COOKIE,
};
use crate::error::AuthError;
use crate::providers::{AuthProvider, AuthUser};
use crate::redirect::login_redirect;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{Redirect, Response};
use cookie::Cookie;
use std::convert::Infallible;
use std::sync::Arc;

/// Shared state for [`resolve_session`].
#[derive(Clone)]
pub struct SessionState {
    /// Auth backend.
    pub provider: Arc<dyn AuthProvider>,
    /// Cookie attributes.
    pub cookies: CookieConfig,
}

impl SessionState {
    /// Create session state.
    #[must_use]
    pub fn new(provider: Arc<dyn AuthProvider>, cookies: CookieConfig) -> Self {
        Self { provider, cookies }
    }
}

/// The signed-in user for this request.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    /// Authenticated user.
    pub user: AuthUser,
    /// Access token valid for this request.
    pub access_token: String,
}

struct Resolution {
    session: Option<ResolvedSession>,
    set_cookies: Vec<Cookie<'static>>,
}

impl Resolution {
    const fn anonymous() -> Self {
        Self {
            session: None,
            set_cookies: Vec::new(),
        }
    }
}

async fn refresh(state: &SessionState, refresh_token: &str) -> Resolution {
    match state.provider.refresh_session(refresh_token).await {
        Ok(session) => {
            tracing::debug!(user_id = %session.user.id, "Session refreshed");
            metrics::counter!("auth.session.refreshed").increment(1);
            Resolution {
                set_cookies: session_cookies(&session, &state.cookies),
                session: Some(ResolvedSession {
                    user: session.user,
                    access_token: session.access_token,
                }),
            }
        },
        Err(error @ (AuthError::Network(_) | AuthError::Provider { .. } | AuthError::InternalError(_))) => {
            tracing::warn!(%error, "Session refresh unavailable");
            Resolution::anonymous()
        },
        Err(error) => {
            tracing::debug!(%error, "Refresh rejected, clearing session");
            Resolution {
                session: None,
                set_cookies: cleared_cookies(&state.cookies),
            }
        },
    }
}

async fn resolve(state: &SessionState, access: Option<String>, refresh_token: Option<String>) -> Resolution {
    if let Some(access) = access {
        match state.provider.get_user(&access).await {
            Ok(user) => {
                return Resolution {
                    session: Some(ResolvedSession {
                        user,
                        access_token: access,
                    }),
                    set_cookies: Vec::new(),
                };
            },
            Err(error) if error.is_session_error() => {
                tracing::debug!("Access token expired");
            },
            Err(error) => {
                tracing::warn!(%error, "Could not validate session");
                return Resolution::anonymous();
            },
        }
    }

    match refresh_token {
        Some(token) => refresh(state, &token).await,
        None => Resolution::anonymous(),
    }
}

/// Middleware that resolves the session cookies into a [`ResolvedSession`].
///
/// Use with `axum::middleware::from_fn_with_state`. Refreshed tokens are
/// written back as cookies unless the handler already set or cleared them
/// (sign-in and sign-out do).
pub async fn resolve_session(
    State(state): State<SessionState>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let access = read_cookie(headers, ACCESS_COOKIE);
    let refresh_token = read_cookie(headers, REFRESH_COOKIE);

    let resolution = if access.is_none() && refresh_token.is_none() {
        Resolution::anonymous()
    } else {
        resolve(&state, access, refresh_token).await
    };

    if let Some(session) = resolution.session {
        request.extensions_mut().insert(session);
    }

    let mut response = next.run(request).await;
    if !resolution.set_cookies.is_empty() && !sets_session_cookie(response.headers()) {
        append_cookies(response.headers_mut(), &resolution.set_cookies);
    }
    response
}

/// Extracts the signed-in user or redirects to `/login?next=…`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<ResolvedSession>() {
            return Ok(Self(session.user.clone()));
        }
        let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        Err(Redirect::to(&login_redirect(target)))
    }
}

/// Extracts the signed-in user if there is one.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ResolvedSession>()
                .map(|session| session.user.clone()),
        ))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ResolvedSession
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| Redirect::to("/login"))
    }
}
