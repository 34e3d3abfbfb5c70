use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushGatewayKind {
    /// Sessions hosted by this process over `/ws`
    Local,
    /// External session gateway reached through an HTTP callback
    Http,
}

/// Token verification settings
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub audience: String,
    pub issuer: Option<String>,
    pub jwks_url: Option<String>,
    pub public_key_pem: Option<String>,
    pub jwks_min_refresh: Duration,
    pub jwks_fetch_timeout: Duration,
    pub leeway_secs: u64,
    pub token_query_param: String,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub gateway: PushGatewayKind,
    pub callback_url: Option<String>,
    pub timeout: Duration,
    pub fanout_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub connections_table: String,
    pub conversations_table: String,
    pub jwt: JwtConfig,
    pub system_caller_id: String,
    pub push: PushConfig,
    pub max_message_chars: usize,
    pub ws: WsConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).ok_or_else(|| AppError::Config(format!("{key} missing")));
        let number = |key: &str, default: u64| -> Result<u64, AppError> {
            match var(key) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| AppError::Config(format!("{key} must be a non-negative integer"))),
                None => Ok(default),
            }
        };

        let port = number("PORT", 3000)?;
        let port = u16::try_from(port).map_err(|_| AppError::Config("PORT out of range".into()))?;

        let store_backend = match var("STORE_BACKEND").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("redis") => StoreBackend::Redis,
            Some(other) => {
                return Err(AppError::Config(format!("unknown STORE_BACKEND {other}")));
            }
        };

        let jwks_url = var("JWKS_URL");
        let public_key_pem = var("JWT_PUBLIC_KEY_PEM");
        if jwks_url.is_none() && public_key_pem.is_none() {
            return Err(AppError::Config(
                "one of JWKS_URL or JWT_PUBLIC_KEY_PEM is required".into(),
            ));
        }

        let jwt = JwtConfig {
            audience: required("JWT_AUDIENCE")?,
            issuer: var("JWT_ISSUER"),
            jwks_url,
            public_key_pem,
            jwks_min_refresh: Duration::from_secs(number("JWKS_MIN_REFRESH_SECS", 60)?),
            jwks_fetch_timeout: Duration::from_millis(number("JWKS_FETCH_TIMEOUT_MS", 5000)?.max(1)),
            leeway_secs: number("JWT_LEEWAY_SECS", 0)?,
            token_query_param: var("TOKEN_QUERY_PARAM").unwrap_or_else(|| "token".into()),
        };

        let gateway = match var("PUSH_GATEWAY").as_deref() {
            None | Some("local") => PushGatewayKind::Local,
            Some("http") => PushGatewayKind::Http,
            Some(other) => {
                return Err(AppError::Config(format!("unknown PUSH_GATEWAY {other}")));
            }
        };
        let callback_url = var("PUSH_CALLBACK_URL");
        if gateway == PushGatewayKind::Http && callback_url.is_none() {
            return Err(AppError::Config(
                "PUSH_CALLBACK_URL is required when PUSH_GATEWAY=http".into(),
            ));
        }

        let push = PushConfig {
            gateway,
            callback_url,
            timeout: Duration::from_millis(number("PUSH_TIMEOUT_MS", 3000)?),
            fanout_concurrency: number("FANOUT_CONCURRENCY", 16)?.max(1) as usize,
        };

        let ws = WsConfig {
            heartbeat_interval: Duration::from_secs(number("WS_HEARTBEAT_SECS", 5)?.max(1)),
            client_timeout: Duration::from_secs(number("WS_CLIENT_TIMEOUT_SECS", 30)?.max(1)),
        };

        Ok(Self {
            port,
            store_backend,
            redis_url: var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            connections_table: var("CONNECTIONS_TABLE")
                .unwrap_or_else(|| "chat-connections".into()),
            conversations_table: var("CONVERSATIONS_TABLE")
                .unwrap_or_else(|| "chat-conversations".into()),
            jwt,
            system_caller_id: required("SYSTEM_CALLER_ID")?,
            push,
            max_message_chars: number("MAX_MESSAGE_CHARS", 4096)?.max(1) as usize,
            ws,
        })
    }
}
