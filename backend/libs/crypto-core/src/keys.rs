//! Signing-key material for identity token verification.
//!
//! Keys are injected into the verifier through [`KeyProvider`] instead of
//! process-wide statics, so each verifier owns exactly the keys it trusts.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("no signing key for kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("key service unavailable: {0}")]
    Unavailable(String),
}

/// Source of public keys used to check token signatures.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Decoding key for the token header's `kid`.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError>;
}

/// A single RSA public key, used regardless of `kid`.
pub struct StaticKeyProvider {
    key: DecodingKey,
}

impl StaticKeyProvider {
    pub fn from_rsa_pem(public_key_pem: &str) -> Result<Self, KeyError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| KeyError::InvalidKey(format!("RSA public key: {e}")))?;
        Ok(Self { key })
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn decoding_key(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        Ok(self.key.clone())
    }
}

/// Upper bound on a single JWKS request.
pub const DEFAULT_JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    /// Last fetch attempt, successful or not
    attempted_at: Option<Instant>,
}

/// Issuer JWKS document, fetched lazily and cached by `kid`.
///
/// An unknown `kid` triggers a refetch (key rotation), throttled to one
/// attempt per `min_refresh` so forged `kid` values cannot hammer the issuer.
/// The fetch runs outside the cache lock: lookups of cached keys never wait
/// on the network.
pub struct JwksKeyProvider {
    url: Option<String>,
    client: reqwest::Client,
    fetch_timeout: Duration,
    min_refresh: Duration,
    cache: RwLock<JwksCache>,
    refresh_lock: Mutex<()>,
}

impl JwksKeyProvider {
    pub fn new(url: impl Into<String>, min_refresh: Duration) -> Self {
        Self {
            url: Some(url.into()),
            client: reqwest::Client::new(),
            fetch_timeout: DEFAULT_JWKS_FETCH_TIMEOUT,
            min_refresh,
            cache: RwLock::new(JwksCache::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Provider preloaded with a key set and no remote endpoint.
    pub fn from_key_set(set: &JwkSet) -> Self {
        Self {
            url: None,
            client: reqwest::Client::new(),
            fetch_timeout: DEFAULT_JWKS_FETCH_TIMEOUT,
            min_refresh: Duration::MAX,
            cache: RwLock::new(JwksCache {
                keys: index_key_set(set),
                attempted_at: Some(Instant::now()),
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub async fn cached_key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.read().await.keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn fetch(&self, url: &str) -> Result<JwkSet, KeyError> {
        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| KeyError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| KeyError::Unavailable(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeyError::Unavailable(format!("decode JWKS: {e}")))
    }

    async fn refresh(&self) -> Result<(), KeyError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };

        // One fetch in flight; the cache stays readable meanwhile.
        let _refreshing = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited for the lock.
        if !self.may_refresh().await {
            return Ok(());
        }

        let fetched = self.fetch(url).await;

        let mut cache = self.cache.write().await;
        cache.attempted_at = Some(Instant::now());
        let set = match fetched {
            Ok(set) => set,
            Err(e) => {
                warn!(url = %url, error = %e, "JWKS fetch failed");
                return Err(e);
            }
        };
        cache.keys = index_key_set(&set);
        info!(url = %url, keys = cache.keys.len(), "JWKS refreshed");
        Ok(())
    }

    async fn may_refresh(&self) -> bool {
        if self.url.is_none() {
            return false;
        }
        match self.cache.read().await.attempted_at {
            None => true,
            Some(at) => at.elapsed() >= self.min_refresh,
        }
    }
}

#[async_trait]
impl KeyProvider for JwksKeyProvider {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        let kid = kid.ok_or(KeyError::UnknownKey(None))?;

        if let Some(key) = self.cache.read().await.keys.get(kid) {
            return Ok(key.clone());
        }

        if self.may_refresh().await {
            debug!(kid = %kid, "kid not cached, refreshing JWKS");
            self.refresh().await?;
            if let Some(key) = self.cache.read().await.keys.get(kid) {
                return Ok(key.clone());
            }
        }

        Err(KeyError::UnknownKey(Some(kid.to_string())))
    }
}

fn index_key_set(set: &JwkSet) -> HashMap<String, DecodingKey> {
    let mut keys = HashMap::new();
    for jwk in &set.keys {
        let Some(kid) = jwk.common.key_id.clone() else {
            warn!("skipping JWK without kid");
            continue;
        };
        match DecodingKey::from_jwk(jwk) {
            Ok(key) => {
                keys.insert(kid, key);
            }
            Err(e) => warn!(kid = %kid, error = %e, "skipping unusable JWK"),
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const JWKS: &str = include_str!("../tests/fixtures/jwks.json");

    fn key_set() -> JwkSet {
        serde_json::from_str(JWKS).expect("fixture JWKS parses")
    }

    #[tokio::test]
    async fn preloaded_key_set_resolves_known_kid() {
        let provider = JwksKeyProvider::from_key_set(&key_set());

        assert_eq!(provider.cached_key_ids().await, vec!["test-key-1".to_string()]);
        assert!(provider.decoding_key(Some("test-key-1")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_or_missing_kid_is_rejected_without_endpoint() {
        let provider = JwksKeyProvider::from_key_set(&key_set());

        assert_eq!(
            provider.decoding_key(Some("rotated-away")).await.err(),
            Some(KeyError::UnknownKey(Some("rotated-away".into())))
        );
        assert_eq!(
            provider.decoding_key(None).await.err(),
            Some(KeyError::UnknownKey(None))
        );
    }

    /// Endpoint that accepts connections and never answers.
    async fn silent_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}/.well-known/jwks.json")
    }

    fn preloaded_with_endpoint(url: String, fetch_timeout: Duration) -> JwksKeyProvider {
        JwksKeyProvider {
            cache: RwLock::new(JwksCache {
                keys: index_key_set(&key_set()),
                attempted_at: None,
            }),
            ..JwksKeyProvider::new(url, Duration::from_secs(60)).with_fetch_timeout(fetch_timeout)
        }
    }

    #[tokio::test]
    async fn cached_kid_resolves_while_refresh_is_stuck() {
        let provider = Arc::new(preloaded_with_endpoint(
            silent_endpoint().await,
            Duration::from_secs(30),
        ));

        let forged = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.decoding_key(Some("forged-kid")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let known = tokio::time::timeout(
            Duration::from_secs(1),
            provider.decoding_key(Some("test-key-1")),
        )
        .await;
        assert!(matches!(known, Ok(Ok(_))));

        forged.abort();
    }

    #[tokio::test]
    async fn hung_endpoint_fails_after_fetch_timeout_and_is_throttled() {
        let provider = preloaded_with_endpoint(silent_endpoint().await, Duration::from_millis(200));

        let first = tokio::time::timeout(
            Duration::from_secs(5),
            provider.decoding_key(Some("forged-kid")),
        )
        .await
        .expect("fetch timeout bounds the lookup");
        assert!(matches!(first, Err(KeyError::Unavailable(_))));

        // The failed attempt counts against min_refresh, so no second fetch
        let started = Instant::now();
        assert_eq!(
            provider.decoding_key(Some("forged-kid")).await.err(),
            Some(KeyError::UnknownKey(Some("forged-kid".into())))
        );
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn static_provider_rejects_garbage_pem() {
        assert!(matches!(
            StaticKeyProvider::from_rsa_pem("not a key"),
            Err(KeyError::InvalidKey(_))
        ));
    }
}
