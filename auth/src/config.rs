//! Hosted auth configuration.

use std::time::Duration;

/// Session cookie settings.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Add the `Secure` attribute. Off for plain-http local development.
    pub secure: bool,

    /// Lifetime of the refresh-token cookie.
    ///
    /// Default: 30 days
    pub refresh_max_age: Duration,
}

impl CookieConfig {
    /// Cookie settings with the given `Secure` flag.
    #[must_use]
    pub const fn new(secure: bool) -> Self {
        Self {
            secure,
            refresh_max_age: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Set refresh cookie lifetime.
    #[must_use]
    pub const fn with_refresh_max_age(mut self, max_age: Duration) -> Self {
        self.refresh_max_age = max_age;
        self
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Hosted auth service configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Project URL, e.g. `https://abc.supabase.co`. Endpoints live under
    /// `{url}/auth/v1`.
    pub url: String,

    /// Public (anon) API key sent as the `apikey` header.
    pub anon_key: String,

    /// Public site URL; email links redirect to `{site_url}/auth/confirm`.
    pub site_url: String,

    /// HTTP timeout for auth calls.
    ///
    /// Default: 10 seconds
    pub timeout: Duration,
}

impl AuthConfig {
    /// Create new auth configuration.
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>, site_url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            site_url: site_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Where email links send the user back to.
    #[must_use]
    pub fn confirm_url(&self) -> String {
        format!("{}/auth/confirm", self.site_url)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path.trim_start_matches('/'))
    }
}
