//! Redis-backed table.
//!
//! Per partition: a hash `{table}:h:{pk}` maps sort key to JSON value, and a
//! sorted set `{table}:i:{pk}` holds every sort key at score 0 so that
//! `ZRANGEBYLEX` yields lexicographic ranges. Multi-item writes go through
//! one `MULTI/EXEC` pipeline.

use super::{Item, KvStore, PrefixQuery, StoreError};
use crate::redis_client::RedisClient;
use async_trait::async_trait;
use redis::AsyncCommands;

pub struct RedisStore {
    client: RedisClient,
    table: String,
}

impl RedisStore {
    pub fn new(client: RedisClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn hash_key(&self, pk: &str) -> String {
        hash_key(&self.table, pk)
    }

    fn index_key(&self, pk: &str) -> String {
        index_key(&self.table, pk)
    }

    fn add_put(&self, pipe: &mut redis::Pipeline, item: &Item) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&item.value)?;
        pipe.hset(self.hash_key(&item.pk), &item.sk, encoded)
            .ignore()
            .zadd(self.index_key(&item.pk), &item.sk, 0)
            .ignore();
        Ok(())
    }
}

// The kind tag sits before the caller-controlled pk, so no pk can make one
// key collide with another partition's key of the other kind.
fn hash_key(table: &str, pk: &str) -> String {
    format!("{table}:h:{pk}")
}

fn index_key(table: &str, pk: &str) -> String {
    format!("{table}:i:{pk}")
}

/// `ZRANGEBYLEX` bounds covering every member that starts with `prefix`.
fn lex_bounds(prefix: &str) -> (Vec<u8>, Vec<u8>) {
    let mut min = Vec::with_capacity(prefix.len() + 1);
    min.push(b'[');
    min.extend_from_slice(prefix.as_bytes());

    let mut max = Vec::with_capacity(prefix.len() + 2);
    max.push(b'(');
    max.extend_from_slice(prefix.as_bytes());
    max.push(0xff);

    (min, max)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let mut conn = self.client.connection();
        let raw: Option<String> = conn.hget(self.hash_key(pk), sk).await?;

        raw.map(|encoded| -> Result<Item, StoreError> {
            Ok(Item {
                pk: pk.to_string(),
                sk: sk.to_string(),
                value: serde_json::from_str(&encoded)?,
            })
        })
        .transpose()
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.add_put(&mut pipe, &item)?;

        let mut conn = self.client.connection();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<(), StoreError> {
        let mut conn = self.client.connection();
        redis::pipe()
            .atomic()
            .hdel(self.hash_key(pk), sk)
            .ignore()
            .zrem(self.index_key(pk), sk)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn query_prefix(&self, pk: &str, query: &PrefixQuery) -> Result<Vec<Item>, StoreError> {
        let (min, max) = lex_bounds(&query.sk_prefix);

        let mut cmd = if query.reverse {
            let mut cmd = redis::cmd("ZREVRANGEBYLEX");
            cmd.arg(self.index_key(pk)).arg(max).arg(min);
            cmd
        } else {
            let mut cmd = redis::cmd("ZRANGEBYLEX");
            cmd.arg(self.index_key(pk)).arg(min).arg(max);
            cmd
        };
        if let Some(limit) = query.limit {
            cmd.arg("LIMIT").arg(0).arg(limit);
        }

        let mut conn = self.client.connection();
        let sort_keys: Vec<String> = cmd.query_async(&mut conn).await?;
        if sort_keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.hash_key(pk))
            .arg(&sort_keys)
            .query_async(&mut conn)
            .await?;

        let mut items = Vec::with_capacity(sort_keys.len());
        for (sk, encoded) in sort_keys.into_iter().zip(values) {
            // Index entry whose value was deleted concurrently
            let Some(encoded) = encoded else { continue };
            items.push(Item {
                pk: pk.to_string(),
                sk,
                value: serde_json::from_str(&encoded)?,
            });
        }
        Ok(items)
    }

    async fn transact_put(&self, items: Vec<Item>) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for item in &items {
            self.add_put(&mut pipe, item)?;
        }

        let mut conn = self.client.connection();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lex_bounds() {
        let (min, max) = lex_bounds("MEMBER#");
        assert_eq!(min, b"[MEMBER#".to_vec());
        assert_eq!(&max[..8], b"(MEMBER#");
        assert_eq!(max.last(), Some(&0xff));
    }

    #[test]
    fn test_partition_keys_do_not_collide() {
        // A pk ending in the old index suffix must not alias another index
        assert_ne!(hash_key("t", "USER#x:idx"), index_key("t", "USER#x"));
        assert_ne!(hash_key("t", "x"), index_key("t", "x"));
        assert_eq!(hash_key("chat-connections", "USER#a"), "chat-connections:h:USER#a");
        assert_eq!(index_key("chat-connections", "USER#a"), "chat-connections:i:USER#a");
    }

    async fn live_store() -> Option<RedisStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let client = RedisClient::from_url(&url).await.ok()?;
        let table = format!("test-{}", uuid::Uuid::new_v4());
        Some(RedisStore::new(client, table))
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn test_live_prefix_query_and_transaction() {
        let Some(store) = live_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        store
            .transact_put(vec![
                Item { pk: "CONV#1".into(), sk: "META".into(), value: json!({"m": 1}) },
                Item { pk: "CONV#1".into(), sk: "MEMBER#a".into(), value: json!({"u": "a"}) },
                Item { pk: "CONV#1".into(), sk: "MEMBER#b".into(), value: json!({"u": "b"}) },
            ])
            .await
            .unwrap();

        let members = store
            .query_prefix("CONV#1", &PrefixQuery::new("MEMBER#"))
            .await
            .unwrap();
        assert_eq!(members.len(), 2);

        let newest = store
            .query_prefix("CONV#1", &PrefixQuery::new("MEMBER#").reverse().limit(1))
            .await
            .unwrap();
        assert_eq!(newest[0].sk, "MEMBER#b");

        store.delete("CONV#1", "MEMBER#a").await.unwrap();
        assert!(store.get("CONV#1", "MEMBER#a").await.unwrap().is_none());
    }
}
