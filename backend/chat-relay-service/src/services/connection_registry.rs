use crate::error::AppResult;
use crate::models::connection::CONN_PREFIX;
use crate::models::ConnectionRecord;
use crate::store::{Item, KvStore, PrefixQuery};
use chrono::Utc;
use std::sync::Arc;

/// Durable map from user identity to live connection ids
///
/// One record per `(userId, connectionId)`; a user may hold several at once.
/// Records can outlive their session, so callers must tolerate stale ids.
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: Arc<dyn KvStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Record a newly opened session. Re-registering the same pair overwrites it.
    pub async fn register(&self, user_id: &str, connection_id: &str) -> AppResult<ConnectionRecord> {
        let record = ConnectionRecord {
            user_id: user_id.to_string(),
            connection_id: connection_id.to_string(),
            connected_at: Utc::now(),
        };

        let item = Item::new(
            ConnectionRecord::partition_key(user_id),
            ConnectionRecord::sort_key(connection_id),
            &record,
        )?;
        self.store.put(item).await?;

        tracing::info!(user_id = %user_id, connection_id = %connection_id, "connection registered");
        Ok(record)
    }

    /// Remove a session record; removing an unknown one is not an error.
    pub async fn deregister(&self, user_id: &str, connection_id: &str) -> AppResult<()> {
        self.store
            .delete(
                &ConnectionRecord::partition_key(user_id),
                &ConnectionRecord::sort_key(connection_id),
            )
            .await?;

        tracing::info!(user_id = %user_id, connection_id = %connection_id, "connection deregistered");
        Ok(())
    }

    pub async fn resolve_connections(&self, user_id: &str) -> AppResult<Vec<String>> {
        let items = self
            .store
            .query_prefix(
                &ConnectionRecord::partition_key(user_id),
                &PrefixQuery::new(CONN_PREFIX),
            )
            .await?;

        Ok(items
            .iter()
            .filter_map(|item| item.sk.strip_prefix(CONN_PREFIX))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect())
    }
}
