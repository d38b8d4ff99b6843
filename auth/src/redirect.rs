//! Post-login redirect targets.

/// Where a signed-in user lands when no `next` is given.
pub const DEFAULT_NEXT: &str = "/dashboard";

/// Keep `next` only if it is a same-site relative path.
///
/// Rejects absolute URLs, protocol-relative `//host` paths, backslash tricks
/// and control characters.
#[must_use]
pub fn sanitize_next(next: Option<&str>) -> String {
    next.map(str::trim)
        .filter(|path| is_local_path(path))
        .map_or_else(|| DEFAULT_NEXT.to_string(), ToString::to_string)
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
        && !path.contains("://")
}

/// `/login?next=…` for the given original path and query.
#[must_use]
pub fn login_redirect(path_and_query: &str) -> String {
    format!("/login?next={}", urlencoding::encode(path_and_query))
}
