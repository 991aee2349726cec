//! Boundary validation for identifiers and slugs.
//!
//! Database names and usernames cross a process boundary (dump tool
//! argument vectors), so they are allow-list validated here before any
//! driver touches them. A rejected identifier is a skip, not a crash.

use rand::Rng;

/// Maximum length accepted for engine identifiers and slugs.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Allow-list check for database identifiers (database name, username):
/// first character alphanumeric or underscore, the rest may add dashes.
pub fn is_safe_identifier(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_IDENTIFIER_LEN {
        return false;
    }
    let mut chars = value.chars();
    let first = chars.next().expect("non-empty checked above");
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Reduce an arbitrary display name to a URL-safe slug fragment:
/// lowercase alphanumerics with single dashes, trimmed, bounded length.
/// Falls back to "project" when nothing survives.
pub fn sanitize_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true; // suppress leading dash
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 40 {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Random lowercase-hex suffix used to disambiguate derived slugs.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len.div_ceil(2)).map(|_| rng.random()).collect();
    let mut s = hex::encode(bytes);
    s.truncate(len);
    s
}

/// Derive a unique-ish project slug from a requested name or filename.
pub fn derive_slug(name: &str) -> String {
    format!("{}-{}", sanitize_slug(name), random_suffix(6))
}

/// Fresh high-entropy secret for synthesized environment files.
pub fn generate_secret() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
    hex::encode(bytes)
}
