use crate::{
    config::{Config, PushGatewayKind, StoreBackend},
    error::{AppError, AppResult},
    gateway::{HttpCallbackGateway, LocalSessionGateway, PushGateway},
    redis_client::RedisClient,
    services::{ConnectionRegistry, ConversationStore, FanoutEngine, FanoutSettings},
    store::{KvStore, MemoryStore, RedisStore},
};
use crypto_core::{
    Authorizer, IdentityVerifier, JwksKeyProvider, KeyProvider, StaticKeyProvider, VerifierConfig,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authorizer: Arc<Authorizer>,
    pub registry: ConnectionRegistry,
    pub conversations: ConversationStore,
    pub fanout: FanoutEngine,
    /// Hosted WebSocket sessions; present only with the local push gateway
    pub sessions: Option<LocalSessionGateway>,
}

/// Backing tables and push transport for [`AppState::new`]
pub struct Backends {
    pub connections: Arc<dyn KvStore>,
    pub conversations: Arc<dyn KvStore>,
    pub gateway: Arc<dyn PushGateway>,
    pub sessions: Option<LocalSessionGateway>,
}

impl AppState {
    pub fn new(config: Arc<Config>, authorizer: Arc<Authorizer>, backends: Backends) -> Self {
        let registry = ConnectionRegistry::new(backends.connections);
        let conversations = ConversationStore::new(backends.conversations, &config.system_caller_id);
        let fanout = FanoutEngine::new(
            conversations.clone(),
            registry.clone(),
            backends.gateway,
            FanoutSettings {
                concurrency: config.push.fanout_concurrency,
                push_timeout: config.push.timeout,
                max_message_chars: config.max_message_chars,
            },
        );

        Self {
            config,
            authorizer,
            registry,
            conversations,
            fanout,
            sessions: backends.sessions,
        }
    }

    /// Build every client named by `config`. Nothing here touches the network
    /// except the Redis connection when the Redis backend is selected.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let authorizer = Arc::new(build_authorizer(&config)?);
        let (connections, conversations) = build_tables(&config).await?;

        let mut sessions = None;
        let gateway: Arc<dyn PushGateway> = match config.push.gateway {
            PushGatewayKind::Local => {
                let local = LocalSessionGateway::new();
                sessions = Some(local.clone());
                Arc::new(local)
            }
            PushGatewayKind::Http => {
                let url = config
                    .push
                    .callback_url
                    .as_deref()
                    .ok_or_else(|| AppError::Config("PUSH_CALLBACK_URL missing".into()))?;
                let gateway = HttpCallbackGateway::new(url, config.push.timeout)
                    .map_err(|e| AppError::StartServer(format!("push gateway: {e}")))?;
                Arc::new(gateway)
            }
        };

        Ok(Self::new(
            Arc::new(config),
            authorizer,
            Backends {
                connections,
                conversations,
                gateway,
                sessions,
            },
        ))
    }
}

pub fn build_authorizer(config: &Config) -> AppResult<Authorizer> {
    let jwt = &config.jwt;

    let keys: Arc<dyn KeyProvider> = match (&jwt.jwks_url, &jwt.public_key_pem) {
        (Some(url), _) => {
            tracing::info!(jwks_url = %url, "verifying tokens against JWKS");
            Arc::new(
                JwksKeyProvider::new(url.clone(), jwt.jwks_min_refresh)
                    .with_fetch_timeout(jwt.jwks_fetch_timeout),
            )
        }
        (None, Some(pem)) => {
            // PEM values pasted into .env files often carry escaped newlines
            let pem = pem.replace("\\n", "\n");
            let provider = StaticKeyProvider::from_rsa_pem(&pem)
                .map_err(|e| AppError::Config(format!("JWT_PUBLIC_KEY_PEM: {e}")))?;
            tracing::info!("verifying tokens against static public key");
            Arc::new(provider)
        }
        (None, None) => {
            return Err(AppError::Config(
                "one of JWKS_URL or JWT_PUBLIC_KEY_PEM is required".into(),
            ));
        }
    };

    let mut verifier_config = VerifierConfig::new(jwt.audience.clone()).with_leeway(jwt.leeway_secs);
    if let Some(issuer) = &jwt.issuer {
        verifier_config = verifier_config.with_issuer(issuer.clone());
    }

    Ok(Authorizer::new(IdentityVerifier::new(keys, verifier_config)))
}

async fn build_tables(config: &Config) -> AppResult<(Arc<dyn KvStore>, Arc<dyn KvStore>)> {
    let tables: (Arc<dyn KvStore>, Arc<dyn KvStore>) = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            (Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let client = RedisClient::from_url(&config.redis_url)
                .await
                .map_err(|e| AppError::StartServer(format!("redis: {e}")))?;
            let connections = RedisStore::new(client.clone(), config.connections_table.clone());
            let conversations = RedisStore::new(client, config.conversations_table.clone());
            (Arc::new(connections), Arc::new(conversations))
        }
    };
    Ok(tables)
}
