//! Token verification and access decisions shared by the chat backend.
//!
//! - `jwt`: Identity Verifier (RS256 identity tokens -> [`jwt::Identity`])
//! - `keys`: signing-key material (static PEM or a cached JWKS document)
//! - `authorization`: Access Decision Builder producing front-door policy decisions
//! - `roles`: canonical role set from loosely shaped claims

pub mod authorization;
pub mod jwt;
pub mod keys;
pub mod roles;

pub use authorization::{extract_token, Authorizer, Effect, PolicyDecision};
pub use jwt::{Identity, IdentityVerifier, Rejection, VerifierConfig};
pub use keys::{JwksKeyProvider, KeyProvider, StaticKeyProvider};
