//! HTML escaping for strings placed into markup outside templates.

use askama_escape::Html;

/// Escape text for HTML content or attribute values, the same way the page
/// templates escape their variables.
#[must_use]
pub fn escape(input: &str) -> String {
    askama_escape::escape(input, Html).to_string()
}
