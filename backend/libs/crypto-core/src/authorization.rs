//! Access Decision Builder.
//!
//! Turns the outcome of identity verification into a front-door policy
//! decision. Deny is total and fails closed; allow is scoped to the exact
//! resource that was requested.

use crate::jwt::{Identity, IdentityVerifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Principal reported on every deny decision
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Resource every deny decision is scoped to
pub const ANY_RESOURCE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Request context forwarded to downstream handlers on allow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Comma-joined canonical roles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub principal_id: String,
    pub effect: Effect,
    pub resource: String,
    pub context: DecisionContext,
}

impl PolicyDecision {
    pub fn allow(identity: &Identity, resource: &str) -> Self {
        let roles: Vec<&str> = identity.roles.iter().map(String::as_str).collect();
        Self {
            principal_id: identity.user_id.clone(),
            effect: Effect::Allow,
            resource: resource.to_string(),
            context: DecisionContext {
                user_id: Some(identity.user_id.clone()),
                roles: Some(roles.join(",")),
            },
        }
    }

    pub fn deny_all() -> Self {
        Self {
            principal_id: ANONYMOUS_PRINCIPAL.to_string(),
            effect: Effect::Deny,
            resource: ANY_RESOURCE.to_string(),
            context: DecisionContext::default(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }

    /// Whether this decision admits a request for `resource`.
    pub fn permits(&self, resource: &str) -> bool {
        self.is_allowed() && (self.resource == resource || self.resource == ANY_RESOURCE)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.context.user_id.as_deref()
    }

    pub fn roles(&self) -> Vec<String> {
        self.context
            .roles
            .as_deref()
            .map(|r| {
                r.split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Wraps an [`IdentityVerifier`] into allow/deny decisions.
pub struct Authorizer {
    verifier: IdentityVerifier,
}

impl Authorizer {
    pub fn new(verifier: IdentityVerifier) -> Self {
        Self { verifier }
    }

    pub async fn authorize(&self, resource: &str, raw_token: Option<&str>) -> PolicyDecision {
        let Some(token) = raw_token else {
            warn!(resource = %resource, reason = "TOKEN_MISSING", "access denied");
            return PolicyDecision::deny_all();
        };

        match self.verifier.verify(token).await {
            Ok(identity) => {
                info!(
                    resource = %resource,
                    user_id = %identity.user_id,
                    "access allowed"
                );
                PolicyDecision::allow(&identity, resource)
            }
            Err(rejection) => {
                warn!(
                    resource = %resource,
                    reason = rejection.code(),
                    error = %rejection,
                    "access denied"
                );
                PolicyDecision::deny_all()
            }
        }
    }
}

/// Token from an `Authorization` header value; the scheme match ignores case.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let value = header_value.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Raw token from the `Authorization` header, or else from `query[query_param]`.
///
/// Blank values count as missing.
pub fn extract_token(
    headers: &HashMap<String, String>,
    query: &HashMap<String, String>,
    query_param: &str,
) -> Option<String> {
    if let Some(token) = find_header(headers, "authorization").and_then(bearer_token) {
        return Some(token.to_string());
    }

    query
        .get(query_param)
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
