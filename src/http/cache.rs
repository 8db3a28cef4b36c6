//! HTTP cache validation module
//!
//! `ETag` generation and `If-None-Match` handling for static assets.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Cache-Control for hashed asset files served from the site directory
pub const ASSET_CACHE_CONTROL: &str = "public, max-age=3600";

/// Generate a strong `ETag` from the file length and content hash
///
/// # Returns
/// Quoted `ETag` string, e.g., `"1a-abc123def"`
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:x}-{:x}\"", content.len(), hasher.finish())
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Weak comparison: `W/` prefixes are ignored, `*` matches anything.
/// Returns true if the client copy is current (respond with 304).
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|header| {
        header.split(',').map(str::trim).any(|candidate| {
            candidate == "*" || candidate.trim_start_matches("W/") == etag
        })
    })
}
