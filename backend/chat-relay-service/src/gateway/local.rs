use super::{PushError, PushGateway};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};

/// Session table of the hosted WebSocket transport
///
/// Maps each live `connectionId` to the outbox of its session actor. Pushing
/// to an id that is not in the table, or whose actor has gone away, reports
/// [`PushError::Gone`].
#[derive(Default, Clone)]
pub struct LocalSessionGateway {
    inner: Arc<RwLock<HashMap<String, UnboundedSender<String>>>>,
}

impl LocalSessionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and return the receiving end of its outbox.
    pub async fn open(&self, connection_id: &str) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.write().await;
        guard.insert(connection_id.to_string(), tx);

        tracing::debug!(
            connection_id = %connection_id,
            open_sessions = guard.len(),
            "session opened"
        );
        rx
    }

    pub async fn close(&self, connection_id: &str) {
        let mut guard = self.inner.write().await;
        if guard.remove(connection_id).is_some() {
            tracing::debug!(
                connection_id = %connection_id,
                open_sessions = guard.len(),
                "session closed"
            );
        }
    }

    pub async fn is_open(&self, connection_id: &str) -> bool {
        self.inner.read().await.contains_key(connection_id)
    }

    /// Open session count (for debugging/metrics)
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl PushGateway for LocalSessionGateway {
    async fn post_to_connection(&self, connection_id: &str, payload: &Value) -> Result<(), PushError> {
        let frame = payload.to_string();

        let sent = match self.inner.read().await.get(connection_id) {
            Some(sender) => sender.send(frame).is_ok(),
            None => return Err(PushError::Gone),
        };

        if !sent {
            // Actor stopped without closing; drop the dead sender
            self.close(connection_id).await;
            return Err(PushError::Gone);
        }
        Ok(())
    }
}
