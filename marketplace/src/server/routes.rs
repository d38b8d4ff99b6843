//! Router configuration for Gigbook.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::pages::{auth, booking, dashboard, directory, profile, waitlist, webhooks};
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::{
    routing::{get, post},
    Router,
};
use gigbook_auth::resolve_session;
use gigbook_web::correlation_id_layer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Stylesheet and images shipped with the crate.
const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Build the complete Axum router.
///
/// Configures all routes including:
/// - Public directory, profiles and waitlist
/// - Booking submission and the client's status pages
/// - Sign-in, sign-up, email links and sign-out
/// - The DJ dashboard and profile editor
/// - The payment webhook, health checks and static files
///
/// Pages run behind the session middleware; the webhook, health checks and
/// static files do not.
pub fn build_router(state: AppState) -> Router {
    let avatar = Router::new()
        .route("/dashboard/profile/avatar", post(profile::upload_avatar))
        .layer(DefaultBodyLimit::max(profile::AVATAR_BODY_LIMIT));

    let pages = Router::new()
        // Public
        .route("/", get(directory::index))
        .route("/waitlist", post(waitlist::join))
        .route("/dj/:slug", get(directory::show))
        .route("/dj/:slug/book", post(booking::submit))
        // Client (token-authorized)
        .route("/requests/:id", get(booking::status))
        .route("/requests/:id/deposit", post(booking::start_deposit))
        .route("/requests/:id/deposit/success", get(booking::deposit_success))
        .route("/requests/:id/deposit/cancel", get(booking::deposit_cancel))
        // Auth
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/signup", get(auth::signup_page).post(auth::signup))
        .route("/auth/magic-link", post(auth::magic_link))
        .route("/auth/confirm", get(auth::confirm))
        .route("/logout", post(auth::logout))
        // Dashboard
        .route("/dashboard", get(dashboard::index))
        .route("/dashboard/profile", get(profile::edit).post(profile::save))
        .route("/dashboard/profile/publish", post(profile::publish))
        .route("/dashboard/profile/unpublish", post(profile::unpublish))
        .route("/dashboard/requests/:id", get(dashboard::show))
        .route("/dashboard/requests/:id/accept", post(dashboard::accept))
        .route("/dashboard/requests/:id/decline", post(dashboard::decline))
        .route("/dashboard/requests/:id/close", post(dashboard::close))
        .merge(avatar)
        .layer(from_fn_with_state(state.session_state(), resolve_session));

    Router::new()
        .merge(pages)
        .route("/webhooks/payments", post(webhooks::payments))
        // Health checks (no session)
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
