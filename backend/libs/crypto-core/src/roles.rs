//! Role claim normalization.
//!
//! Identity providers deliver group/role membership either as a JSON array or
//! as a single comma-separated string. Everything downstream of the verifier
//! only ever sees the canonical form produced here.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Claim names consulted for role membership, in priority order.
pub const ROLE_CLAIMS: [&str; 2] = ["cognito:groups", "roles"];

/// Map any accepted claim shape to a sorted, de-duplicated, lower-cased set.
///
/// Unrecognised shapes (numbers, objects, null) yield an empty set.
pub fn normalize_roles(value: &Value) -> BTreeSet<String> {
    let raw: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => s.split(',').collect(),
        _ => Vec::new(),
    };

    raw.into_iter()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Roles from the first role claim present in `claims`.
pub fn roles_from_claims(claims: &Map<String, Value>) -> BTreeSet<String> {
    ROLE_CLAIMS
        .iter()
        .find_map(|name| claims.get(*name))
        .map(normalize_roles)
        .unwrap_or_default()
}
