use super::{Item, KvStore, PrefixQuery, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Key = (String, String);

/// Process-local table for development and tests.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<Key, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(&(pk.to_string(), sk.to_string()))
            .map(|value| Item {
                pk: pk.to_string(),
                sk: sk.to_string(),
                value: value.clone(),
            }))
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .insert((item.pk, item.sk), item.value);
        Ok(())
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .remove(&(pk.to_string(), sk.to_string()));
        Ok(())
    }

    async fn query_prefix(&self, pk: &str, query: &PrefixQuery) -> Result<Vec<Item>, StoreError> {
        let guard = self.inner.read().await;
        let start = (pk.to_string(), query.sk_prefix.clone());

        let matching = guard
            .range(start..)
            .take_while(|((p, s), _)| p == pk && s.starts_with(&query.sk_prefix))
            .map(|((p, s), v)| Item {
                pk: p.clone(),
                sk: s.clone(),
                value: v.clone(),
            });

        let mut items: Vec<Item> = matching.collect();
        if query.reverse {
            items.reverse();
        }
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn transact_put(&self, items: Vec<Item>) -> Result<(), StoreError> {
        // One write guard covers the whole batch
        let mut guard = self.inner.write().await;
        for item in items {
            guard.insert((item.pk, item.sk), item.value);
        }
        Ok(())
    }
}
