//! Resource kind canonicalization
//!
//! Free-text resource identifiers are turned into keys the policy engine
//! accepts in policy ids (`resource.<kind>.vdefault`).

use super::types::POLICY_VERSION;

/// Resource kind used when the caller supplies nothing usable
pub const DEFAULT_RESOURCE_KIND: &str = "default_resource";

lazy_static::lazy_static! {
    static ref NON_ALPHANUMERIC: regex::Regex = regex::Regex::new(r"[^A-Za-z0-9]").unwrap();
}

/// Canonicalize a resource identifier.
///
/// Every character outside `[A-Za-z0-9]` becomes `_`, leading and trailing
/// non-alphanumerics are trimmed and the result is lower-cased. Input that
/// normalizes to nothing maps to [`DEFAULT_RESOURCE_KIND`], which keeps the
/// function idempotent.
pub fn normalize_resource_kind(raw: &str) -> String {
    let replaced = NON_ALPHANUMERIC.replace_all(raw, "_");
    let trimmed = replaced.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if trimmed.is_empty() {
        return DEFAULT_RESOURCE_KIND.to_string();
    }
    trimmed.to_lowercase()
}

/// Policy id of the resource policy for an already-normalized kind
pub fn policy_id(resource_kind: &str) -> String {
    format!("resource.{}.v{}", resource_kind, POLICY_VERSION)
}
