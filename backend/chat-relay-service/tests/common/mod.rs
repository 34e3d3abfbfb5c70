//! Shared fixtures: an in-memory `AppState`, a recording push gateway, a
//! store that can be switched into failure and signed identity tokens.
#![allow(dead_code)]

use async_trait::async_trait;
use chat_relay_service::{
    config::Config,
    gateway::{LocalSessionGateway, PushError, PushGateway},
    state::{AppState, Backends},
    store::{Item, KvStore, MemoryStore, PrefixQuery, StoreError},
};
use chrono::Utc;
use crypto_core::{Authorizer, IdentityVerifier, StaticKeyProvider, VerifierConfig};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// Test RSA key pair - FOR TESTING ONLY
const TEST_PRIVATE_KEY: &str =
    include_str!("../../../libs/crypto-core/tests/fixtures/test_private_key.pem");
const TEST_PUBLIC_KEY: &str =
    include_str!("../../../libs/crypto-core/tests/fixtures/test_public_key.pem");

pub const AUDIENCE: &str = "chat-client";
pub const SYSTEM_CALLER: &str = "system";

/// Push double: records every delivered payload; ids in `gone` report `Gone`.
#[derive(Default)]
pub struct RecordingGateway {
    pushes: Mutex<Vec<(String, Value)>>,
    gone: Mutex<HashSet<String>>,
}

impl RecordingGateway {
    pub async fn mark_gone(&self, connection_id: &str) {
        self.gone.lock().await.insert(connection_id.to_string());
    }

    pub async fn pushes(&self) -> Vec<(String, Value)> {
        self.pushes.lock().await.clone()
    }

    pub async fn pushes_to(&self, connection_id: &str) -> Vec<Value> {
        self.pushes
            .lock()
            .await
            .iter()
            .filter(|(c, _)| c == connection_id)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn post_to_connection(&self, connection_id: &str, payload: &Value) -> Result<(), PushError> {
        if self.gone.lock().await.contains(connection_id) {
            return Err(PushError::Gone);
        }
        self.pushes
            .lock()
            .await
            .push((connection_id.to_string(), payload.clone()));
        Ok(())
    }
}

/// Table double over a `MemoryStore`; once `fail_writes(true)` is set every
/// write reports a backend error and leaves the table untouched.
pub struct FailingStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused (10.0.0.3:6379)".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        self.inner.get(pk, sk).await
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(item).await
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(pk, sk).await
    }

    async fn query_prefix(&self, pk: &str, query: &PrefixQuery) -> Result<Vec<Item>, StoreError> {
        self.inner.query_prefix(pk, query).await
    }

    async fn transact_put(&self, items: Vec<Item>) -> Result<(), StoreError> {
        self.check()?;
        self.inner.transact_put(items).await
    }
}

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<RecordingGateway>,
    pub conversations_table: MemoryStore,
    pub connections: Arc<FailingStore>,
    pub conversations: Arc<FailingStore>,
}

pub fn test_config() -> Config {
    config_with_gateway("http")
}

pub fn config_with_gateway(gateway: &str) -> Config {
    let vars = [
        ("JWT_AUDIENCE", AUDIENCE),
        ("JWKS_URL", "https://idp.example.com/.well-known/jwks.json"),
        ("SYSTEM_CALLER_ID", SYSTEM_CALLER),
        ("PUSH_GATEWAY", gateway),
        ("PUSH_CALLBACK_URL", "https://gateway.example.com/@connections"),
    ];
    Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .expect("test config")
}

pub fn authorizer() -> Arc<Authorizer> {
    let keys = StaticKeyProvider::from_rsa_pem(TEST_PUBLIC_KEY).expect("public key");
    Arc::new(Authorizer::new(IdentityVerifier::new(
        Arc::new(keys),
        VerifierConfig::new(AUDIENCE),
    )))
}

pub fn test_app() -> TestApp {
    let gateway = Arc::new(RecordingGateway::default());
    let conversations_table = MemoryStore::new();
    let connections = Arc::new(FailingStore::new(MemoryStore::new()));
    let conversations = Arc::new(FailingStore::new(conversations_table.clone()));

    let state = AppState::new(
        Arc::new(test_config()),
        authorizer(),
        Backends {
            connections: connections.clone(),
            conversations: conversations.clone(),
            gateway: gateway.clone(),
            sessions: None,
        },
    );

    TestApp {
        state,
        gateway,
        conversations_table,
        connections,
        conversations,
    }
}

pub struct SessionApp {
    pub state: AppState,
    pub sessions: LocalSessionGateway,
    pub connections: Arc<FailingStore>,
}

/// State that hosts its own WebSocket sessions, as `PUSH_GATEWAY=local` does.
pub fn local_session_app() -> SessionApp {
    let sessions = LocalSessionGateway::new();
    let connections = Arc::new(FailingStore::new(MemoryStore::new()));
    let state = AppState::new(
        Arc::new(config_with_gateway("local")),
        authorizer(),
        Backends {
            connections: connections.clone(),
            conversations: Arc::new(MemoryStore::new()),
            gateway: Arc::new(sessions.clone()),
            sessions: Some(sessions.clone()),
        },
    );
    SessionApp {
        state,
        sessions,
        connections,
    }
}

pub fn token_for(sub: &str) -> String {
    let claims = json!({
        "sub": sub,
        "aud": AUDIENCE,
        "token_use": "id",
        "exp": Utc::now().timestamp() + 600,
    });
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).expect("private key");
    encode(&Header::new(Algorithm::RS256), &claims, &key).expect("sign")
}
