//! Helpers for turning registry values into safe paths and log fields.
//!
//! Logs are safe to share for debugging. These functions make sure no
//! credential leaks into a log line and that version strings never escape
//! the work directory.

/// Number of token characters that may appear in logs.
const TOKEN_PREVIEW_LEN: usize = 10;

/// Replaces `:` and `/` with `_` so a version identifier can be used as a
/// single directory name.
///
/// - `v1.2.0` → `v1.2.0`
/// - `sha256:abcd` → `sha256_abcd`
/// - `release/2024` → `release_2024`
pub fn sanitize_path(s: &str) -> String {
    s.replace([':', '/'], "_")
}

/// Removes every character outside printable ASCII.
///
/// Tokens pasted into secrets often carry stray newlines or BOMs which make
/// the `Authorization` header invalid.
pub fn strip_non_printable(s: &str) -> String {
    s.chars().filter(|c| (' '..='~').contains(c)).collect()
}

/// Returns a short prefix of a token for correlation in logs.
///
/// - `ghp_0123456789abcdef` → `ghp_012345...`
/// - `short` → `short`
pub fn token_preview(token: &str) -> String {
    if token.chars().count() > TOKEN_PREVIEW_LEN {
        let prefix: String = token.chars().take(TOKEN_PREVIEW_LEN).collect();
        format!("{}...", prefix)
    } else {
        token.to_string()
    }
}
