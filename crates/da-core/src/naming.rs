//! Qualified-name composition and existence matching.
//!
//! The service offers no direct lookup by composed name, so existence
//! is a linear scan of the full listing for an exact match. A partial
//! or prefix match is never treated as existing.

/// Fully qualified resource name as the service lists it:
/// `<nickname>.<id>+<alias>`.
pub fn qualified_name(nickname: &str, id: &str, alias: &str) -> String {
    format!("{nickname}.{id}+{alias}")
}

/// Exact-match scan over a listing of qualified names.
pub fn listing_contains(listing: &[String], expected: &str) -> bool {
    listing.iter().any(|name| name == expected)
}
