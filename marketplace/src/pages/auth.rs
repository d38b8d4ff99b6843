//! Sign-in, sign-up, email links and sign-out.
//!
//! Sessions live in two cookies set here and refreshed by the session
//! middleware. Provider failures that the user can act on are shown as
//! flash errors; the rest are logged and replaced by a generic message.

use super::{render, Chrome};
use crate::server::AppState;
use crate::validation;
use askama::Template;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use gigbook_auth::cookies::{append_cookies, cleared_cookies, session_cookies};
use gigbook_auth::{sanitize_next, AuthError, AuthSession, MaybeUser, OtpType, ResolvedSession, SignUpOutcome};
use gigbook_web::flash::{self, with_param};
use gigbook_web::{Flash, WebResult};
use serde::Deserialize;

/// Shortest password accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Query of the login and signup pages.
#[derive(Debug, Default, Deserialize)]
pub struct AuthPageQuery {
    /// Where to go after signing in.
    #[serde(default)]
    pub next: Option<String>,
    /// Flash notice.
    #[serde(default)]
    pub message: Option<String>,
    /// Flash error.
    #[serde(default)]
    pub error: Option<String>,
}

/// Email and password form.
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Where to go after signing in.
    #[serde(default)]
    pub next: Option<String>,
}

/// Magic link form.
#[derive(Debug, Deserialize)]
pub struct MagicLinkForm {
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// Where to go after signing in.
    #[serde(default)]
    pub next: Option<String>,
}

/// Query of an email link.
#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    /// One-time token hash.
    #[serde(default)]
    pub token_hash: String,
    /// Link type, e.g. `magiclink` or `signup`.
    #[serde(default, rename = "type")]
    pub otp_type: String,
    /// Where to go afterwards.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginPage {
    chrome: Chrome,
    next: String,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupPage {
    chrome: Chrome,
    next: String,
}

/// `/login?next=` or `/signup?next=` with an error flash.
fn back_to(page: &str, next: &str, error: &str) -> Response {
    flash::error(&with_param(page, "next", next), error).into_response()
}

fn auth_failure(page: &str, next: &str, error: &AuthError) -> Response {
    if error.is_user_error() {
        tracing::debug!(%error, "Auth rejected");
    } else {
        tracing::warn!(%error, "Auth provider failed");
    }
    back_to(page, next, &error.user_message())
}

/// Redirect to `target` with the session cookies set.
fn signed_in(state: &AppState, session: &AuthSession, target: &str) -> Response {
    tracing::info!(user_id = %session.user.id, "Signed in");
    metrics::counter!("auth.sign_in").increment(1);
    let mut response = Redirect::to(target).into_response();
    append_cookies(response.headers_mut(), &session_cookies(session, &state.settings.cookies));
    response
}

/// Where email links should send the user back to.
fn confirm_url(state: &AppState, next: &str) -> String {
    state
        .settings
        .links
        .absolute(&with_param("/auth/confirm", "next", next))
}

/// `GET /login`
pub async fn login_page(MaybeUser(user): MaybeUser, Query(query): Query<AuthPageQuery>) -> WebResult<Response> {
    let next = sanitize_next(query.next.as_deref());
    if user.is_some() {
        return Ok(Redirect::to(&next).into_response());
    }
    let chrome = Chrome::new(None, Flash {
        message: query.message,
        error: query.error,
    });
    Ok(render(&LoginPage { chrome, next })?.into_response())
}

/// `POST /login`
pub async fn login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let next = sanitize_next(form.next.as_deref());
    if form.email.trim().is_empty() || form.password.is_empty() {
        return back_to("/login", &next, "Enter your email and password");
    }

    match state
        .services
        .auth
        .sign_in_with_password(form.email.trim(), &form.password)
        .await
    {
        Ok(session) => signed_in(&state, &session, &next),
        Err(error) => auth_failure("/login", &next, &error),
    }
}

/// `GET /signup`
pub async fn signup_page(MaybeUser(user): MaybeUser, Query(query): Query<AuthPageQuery>) -> WebResult<Response> {
    let next = sanitize_next(query.next.as_deref());
    if user.is_some() {
        return Ok(Redirect::to(&next).into_response());
    }
    let chrome = Chrome::new(None, Flash {
        message: query.message,
        error: query.error,
    });
    Ok(render(&SignupPage { chrome, next })?.into_response())
}

/// `POST /signup`
pub async fn signup(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let next = sanitize_next(form.next.as_deref());
    let email = match validation::email("email", &form.email) {
        Ok(email) => email,
        Err(error) => return back_to("/signup", &next, &error.message),
    };
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return back_to(
            "/signup",
            &next,
            &format!("Passwords need at least {MIN_PASSWORD_LEN} characters"),
        );
    }

    match state
        .services
        .auth
        .sign_up(&email, &form.password, &confirm_url(&state, &next))
        .await
    {
        Ok(SignUpOutcome::SignedIn(session)) => {
            metrics::counter!("auth.sign_up").increment(1);
            signed_in(&state, &session, &with_param(&next, "message", "Welcome to Gigbook!"))
        },
        Ok(SignUpOutcome::ConfirmationSent) => {
            metrics::counter!("auth.sign_up").increment(1);
            tracing::info!("Sign-up awaiting email confirmation");
            flash::message(
                &with_param("/login", "next", &next),
                "Check your inbox to confirm your email address",
            )
            .into_response()
        },
        Err(error) => auth_failure("/signup", &next, &error),
    }
}

/// `POST /auth/magic-link`
pub async fn magic_link(State(state): State<AppState>, Form(form): Form<MagicLinkForm>) -> Response {
    let next = sanitize_next(form.next.as_deref());
    let email = match validation::email("email", &form.email) {
        Ok(email) => email,
        Err(error) => return back_to("/login", &next, &error.message),
    };

    match state
        .services
        .auth
        .send_magic_link(&email, &confirm_url(&state, &next))
        .await
    {
        Ok(()) => flash::message(
            &with_param("/login", "next", &next),
            "Check your inbox for a sign-in link",
        )
        .into_response(),
        Err(error) => auth_failure("/login", &next, &error),
    }
}

/// `GET /auth/confirm?token_hash=&type=`
pub async fn confirm(State(state): State<AppState>, Query(query): Query<ConfirmQuery>) -> Response {
    let next = sanitize_next(query.next.as_deref());
    let otp_type = match query.otp_type.parse::<OtpType>() {
        Ok(otp_type) if !query.token_hash.is_empty() => otp_type,
        Ok(_) => return auth_failure("/login", &next, &AuthError::LinkExpired),
        Err(error) => return auth_failure("/login", &next, &error),
    };

    match state.services.auth.verify_otp(&query.token_hash, otp_type).await {
        Ok(session) => signed_in(&state, &session, &next),
        Err(error) => auth_failure("/login", &next, &error),
    }
}

/// `POST /logout`
pub async fn logout(State(state): State<AppState>, session: Option<ResolvedSession>) -> Response {
    if let Some(session) = session {
        if let Err(error) = state.services.auth.sign_out(&session.access_token).await {
            // The cookies go either way.
            tracing::warn!(%error, "Sign-out call failed");
        }
        tracing::info!(user_id = %session.user.id, "Signed out");
    }
    let mut response = flash::message("/", "You're signed out").into_response();
    append_cookies(response.headers_mut(), &cleared_cookies(&state.settings.cookies));
    response
}
