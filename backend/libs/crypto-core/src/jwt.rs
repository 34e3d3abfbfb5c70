//! Identity token verification for the chat backend
//!
//! Validates bearer identity tokens issued by the external identity provider
//! and turns them into an [`Identity`]. Verification is a pure function of the
//! token and the trusted key material; there is no stored state.
//!
//! ## Security Design
//!
//! - **RS256 ONLY**: any other `alg` is rejected before key lookup
//! - **Identity tokens only**: `token_use` must be `"id"`, access tokens are rejected
//! - **Audience bound**: `aud` must equal the configured client id
//! - **All or nothing**: any failed check yields a [`Rejection`], never a partial identity

use crate::keys::{KeyError, KeyProvider};
use crate::roles::roles_from_claims;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// JWT algorithm accepted for identity tokens
const JWT_ALGORITHM: Algorithm = Algorithm::RS256;

/// `token_use` value carried by identity tokens
pub const IDENTITY_TOKEN_USE: &str = "id";

/// Verified caller identity
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Subject claim; the stable user identifier used everywhere downstream
    pub user_id: String,
    /// Canonical role set (see [`crate::roles`])
    pub roles: BTreeSet<String>,
    /// Raw claim map as issued
    pub claims: Map<String, Value>,
}

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("token missing")]
    Missing,

    #[error("token malformed: {0}")]
    Malformed(String),

    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("unknown signing key")]
    UnknownKey,

    #[error("signature verification failed")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("audience mismatch")]
    WrongAudience,

    #[error("issuer mismatch")]
    WrongIssuer,

    #[error("token is not an identity token")]
    WrongTokenUse,

    #[error("signing keys unavailable: {0}")]
    KeyUnavailable(String),
}

impl Rejection {
    /// Stable machine-readable reason, safe to log.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Missing => "TOKEN_MISSING",
            Rejection::Malformed(_) => "TOKEN_MALFORMED",
            Rejection::UnsupportedAlgorithm => "TOKEN_ALGORITHM",
            Rejection::UnknownKey => "TOKEN_UNKNOWN_KEY",
            Rejection::BadSignature => "TOKEN_SIGNATURE",
            Rejection::Expired => "TOKEN_EXPIRED",
            Rejection::WrongAudience => "TOKEN_AUDIENCE",
            Rejection::WrongIssuer => "TOKEN_ISSUER",
            Rejection::WrongTokenUse => "TOKEN_USE",
            Rejection::KeyUnavailable(_) => "TOKEN_KEYS_UNAVAILABLE",
        }
    }
}

impl From<KeyError> for Rejection {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::UnknownKey(_) => Rejection::UnknownKey,
            KeyError::InvalidKey(msg) | KeyError::Unavailable(msg) => Rejection::KeyUnavailable(msg),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Rejection {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => Rejection::Expired,
            ErrorKind::InvalidAudience => Rejection::WrongAudience,
            ErrorKind::InvalidIssuer => Rejection::WrongIssuer,
            ErrorKind::InvalidSignature => Rejection::BadSignature,
            ErrorKind::InvalidAlgorithm => Rejection::UnsupportedAlgorithm,
            ErrorKind::MissingRequiredClaim(claim) => {
                Rejection::Malformed(format!("missing claim {claim}"))
            }
            _ => Rejection::Malformed(e.to_string()),
        }
    }
}

/// Expected token binding
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Client id the token must be issued for (`aud`)
    pub audience: String,
    /// Expected `iss`; unchecked when `None`
    pub issuer: Option<String>,
    /// Clock skew tolerated on `exp`, in seconds
    pub leeway_secs: u64,
}

impl VerifierConfig {
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            issuer: None,
            leeway_secs: 0,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }
}

/// Identity Verifier: `verify(raw_token) -> Identity | Rejection`
pub struct IdentityVerifier {
    keys: Arc<dyn KeyProvider>,
    config: VerifierConfig,
}

impl IdentityVerifier {
    pub fn new(keys: Arc<dyn KeyProvider>, config: VerifierConfig) -> Self {
        Self { keys, config }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = self.config.leeway_secs;
        validation.set_audience(&[self.config.audience.as_str()]);
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);
        validation
    }

    /// Validate a raw bearer token (without the `Bearer ` prefix).
    ///
    /// Checks, in order: header shape and algorithm, signing key, signature,
    /// expiry, audience, issuer, `token_use`, and a non-empty subject.
    pub async fn verify(&self, raw_token: &str) -> Result<Identity, Rejection> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Err(Rejection::Missing);
        }

        let header = decode_header(raw_token).map_err(|e| Rejection::Malformed(e.to_string()))?;
        if header.alg != JWT_ALGORITHM {
            return Err(Rejection::UnsupportedAlgorithm);
        }

        let key = self.keys.decoding_key(header.kid.as_deref()).await?;
        let data = decode::<Map<String, Value>>(raw_token, &key, &self.validation())?;
        let claims = data.claims;

        if claims.get("token_use").and_then(Value::as_str) != Some(IDENTITY_TOKEN_USE) {
            return Err(Rejection::WrongTokenUse);
        }

        let user_id = claims
            .get("sub")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Rejection::Malformed("empty subject".into()))?
            .to_string();

        Ok(Identity {
            user_id,
            roles: roles_from_claims(&claims),
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{JwksKeyProvider, StaticKeyProvider};
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    // Test RSA key pairs - FOR TESTING ONLY
    const TEST_PRIVATE_KEY: &str = include_str!("../tests/fixtures/test_private_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../tests/fixtures/test_public_key.pem");
    const UNTRUSTED_PRIVATE_KEY: &str = include_str!("../tests/fixtures/untrusted_private_key.pem");
    const JWKS: &str = include_str!("../tests/fixtures/jwks.json");

    const AUDIENCE: &str = "chat-client";
    const ISSUER: &str = "https://idp.example.com/pool";

    fn sign_with(private_key: &str, claims: Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("test-key-1".into());
        let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn claims_for(sub: &str) -> Value {
        json!({
            "sub": sub,
            "aud": AUDIENCE,
            "iss": ISSUER,
            "token_use": "id",
            "iat": Utc::now().timestamp(),
            "exp": Utc::now().timestamp() + 3600,
            "cognito:groups": ["Support"],
        })
    }

    fn verifier() -> IdentityVerifier {
        let keys = StaticKeyProvider::from_rsa_pem(TEST_PUBLIC_KEY).unwrap();
        IdentityVerifier::new(
            Arc::new(keys),
            VerifierConfig::new(AUDIENCE).with_issuer(ISSUER),
        )
    }

    #[tokio::test]
    async fn test_valid_identity_token() {
        let token = sign_with(TEST_PRIVATE_KEY, claims_for("alice"));

        let identity = verifier().verify(&token).await.unwrap();

        assert_eq!(identity.user_id, "alice");
        assert!(identity.roles.contains("support"));
        assert_eq!(identity.claims["token_use"], "id");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let mut claims = claims_for("alice");
        claims["exp"] = json!(Utc::now().timestamp() - 3600);
        let token = sign_with(TEST_PRIVATE_KEY, claims);

        assert_eq!(verifier().verify(&token).await, Err(Rejection::Expired));
    }

    #[tokio::test]
    async fn test_wrong_audience() {
        let mut claims = claims_for("alice");
        claims["aud"] = json!("some-other-client");
        let token = sign_with(TEST_PRIVATE_KEY, claims);

        assert_eq!(verifier().verify(&token).await, Err(Rejection::WrongAudience));
    }

    #[tokio::test]
    async fn test_wrong_issuer() {
        let mut claims = claims_for("alice");
        claims["iss"] = json!("https://evil.example.com");
        let token = sign_with(TEST_PRIVATE_KEY, claims);

        assert_eq!(verifier().verify(&token).await, Err(Rejection::WrongIssuer));
    }

    #[tokio::test]
    async fn test_access_token_is_not_an_identity() {
        let mut claims = claims_for("alice");
        claims["token_use"] = json!("access");
        let token = sign_with(TEST_PRIVATE_KEY, claims);

        assert_eq!(verifier().verify(&token).await, Err(Rejection::WrongTokenUse));
    }

    #[tokio::test]
    async fn test_untrusted_signer() {
        let token = sign_with(UNTRUSTED_PRIVATE_KEY, claims_for("mallory"));

        assert_eq!(verifier().verify(&token).await, Err(Rejection::BadSignature));
    }

    #[tokio::test]
    async fn test_symmetric_algorithm_rejected() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims_for("mallory"),
            &EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();

        assert_eq!(
            verifier().verify(&token).await,
            Err(Rejection::UnsupportedAlgorithm)
        );
    }

    #[tokio::test]
    async fn test_garbage_and_empty_tokens() {
        assert!(matches!(
            verifier().verify("invalid.token.here").await,
            Err(Rejection::Malformed(_))
        ));
        assert_eq!(verifier().verify("   ").await, Err(Rejection::Missing));
    }

    #[tokio::test]
    async fn test_blank_subject_rejected() {
        let token = sign_with(TEST_PRIVATE_KEY, claims_for(" "));

        assert!(matches!(
            verifier().verify(&token).await,
            Err(Rejection::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_jwks_key_lookup_by_kid() {
        let set = serde_json::from_str(JWKS).unwrap();
        let verifier = IdentityVerifier::new(
            Arc::new(JwksKeyProvider::from_key_set(&set)),
            VerifierConfig::new(AUDIENCE),
        );

        let token = sign_with(TEST_PRIVATE_KEY, claims_for("bob"));
        assert_eq!(verifier.verify(&token).await.unwrap().user_id, "bob");

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("retired-key".into());
        let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).unwrap();
        let stale = encode(&header, &claims_for("bob"), &key).unwrap();
        assert_eq!(verifier.verify(&stale).await, Err(Rejection::UnknownKey));
    }
}
