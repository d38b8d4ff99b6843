//! Session cookies.
//!
//! Two cookies carry the session: the access token (lives as long as the
//! token) and the refresh token (lives for [`CookieConfig::refresh_max_age`]).
//! Both are `HttpOnly`, `SameSite=Lax`, `Path=/`.

use crate::config::CookieConfig;
use crate::providers::AuthSession;
use axum::http::{header, HeaderMap, HeaderValue};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

/// Access-token cookie name.
pub const ACCESS_COOKIE: &str = "gb-access-token";

/// Refresh-token cookie name.
pub const REFRESH_COOKIE: &str = "gb-refresh-token";

fn build(name: &'static str, value: String, max_age: Duration, config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure)
        .max_age(max_age)
        .build()
}

/// Cookies that store `session`.
#[must_use]
pub fn session_cookies(session: &AuthSession, config: &CookieConfig) -> Vec<Cookie<'static>> {
    let refresh_secs = i64::try_from(config.refresh_max_age.as_secs()).unwrap_or(i64::MAX);
    vec![
        build(
            ACCESS_COOKIE,
            session.access_token.clone(),
            Duration::seconds(session.expires_in.max(0)),
            config,
        ),
        build(
            REFRESH_COOKIE,
            session.refresh_token.clone(),
            Duration::seconds(refresh_secs),
            config,
        ),
    ]
}

/// Cookies that delete the session.
#[must_use]
pub fn cleared_cookies(config: &CookieConfig) -> Vec<Cookie<'static>> {
    vec![
        build(ACCESS_COOKIE, String::new(), Duration::ZERO, config),
        build(REFRESH_COOKIE, String::new(), Duration::ZERO, config),
    ]
}

/// Append `Set-Cookie` headers.
pub fn append_cookies(headers: &mut HeaderMap, cookies: &[Cookie<'static>]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            },
            Err(error) => tracing::warn!(name = cookie.name(), %error, "Unencodable cookie"),
        }
    }
}

/// Read a cookie from the request `Cookie` header(s).
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

/// Returns `true` if the response already writes the session cookies.
#[must_use]
pub fn sets_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&format!("{ACCESS_COOKIE}=")))
}
