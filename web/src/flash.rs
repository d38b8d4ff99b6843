//! Query-string flash messages.
//!
//! Form handlers redirect with `?message=` on success and `?error=` on
//! failure; the page handler reads them back with the [`Flash`] extractor
//! and the template renders whichever is present.

use axum::response::Redirect;
use serde::Deserialize;

/// Flash message carried in the query string of a redirect target.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Flash {
    /// Success notice.
    #[serde(default)]
    pub message: Option<String>,
    /// Failure notice.
    #[serde(default)]
    pub error: Option<String>,
}

impl Flash {
    /// Returns `true` when neither message nor error is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.as_deref().is_none_or(str::is_empty)
            && self.error.as_deref().is_none_or(str::is_empty)
    }
}

/// Append `key=value` to `path`, URL-encoding the value.
#[must_use]
pub fn with_param(path: &str, key: &str, value: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{key}={}", urlencoding::encode(value))
}

/// 303 redirect to `path` with a success flash.
#[must_use]
pub fn message(path: &str, text: &str) -> Redirect {
    Redirect::to(&with_param(path, "message", text))
}

/// 303 redirect to `path` with an error flash.
#[must_use]
pub fn error(path: &str, text: &str) -> Redirect {
    Redirect::to(&with_param(path, "error", text))
}
