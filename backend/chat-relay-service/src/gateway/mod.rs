//! Push delivery seam: "post a JSON payload to a named live connection".

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod http;
pub mod local;

pub use self::http::HttpCallbackGateway;
pub use self::local::LocalSessionGateway;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The target session no longer exists
    #[error("connection gone")]
    Gone,

    #[error("push transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn post_to_connection(&self, connection_id: &str, payload: &Value) -> Result<(), PushError>;
}
