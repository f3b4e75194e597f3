//! Account identifier normalization.
//!
//! Identifiers come in two canonical shapes: group identifiers, which pass
//! through unchanged, and direct-message identifiers, which are collapsed
//! to `local-part@canonical-domain`. Years of bot history produced keys
//! under legacy alias domains (`c.us`) and bare phone numbers; all of them
//! normalize to the same canonical key.

/// Canonical direct-message domain.
pub const CANONICAL_DOMAIN: &str = "s.whatsapp.net";

/// Suffix marking group identifiers, which are never rewritten.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Normalize an account identifier.
///
/// Idempotent: normalizing an already-normalized identifier yields itself.
pub fn normalize(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() || id.ends_with(GROUP_SUFFIX) {
        return id.to_string();
    }
    let local = match id.split_once('@') {
        Some((local, _alias_domain)) => local,
        None => id,
    };
    format!("{}@{}", local, CANONICAL_DOMAIN)
}
