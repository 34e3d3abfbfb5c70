//! Key-value persistence seam.
//!
//! Every record is an item addressed by `(partition key, sort key)` holding a
//! JSON value. A store instance is one table; sort keys order
//! lexicographically inside a partition.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub pk: String,
    pub sk: String,
    pub value: Value,
}

impl Item {
    pub fn new<T: Serialize>(pk: impl Into<String>, sk: impl Into<String>, value: &T) -> Result<Self, StoreError> {
        Ok(Self {
            pk: pk.into(),
            sk: sk.into(),
            value: serde_json::to_value(value)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Sort-key prefix scan within one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixQuery {
    pub sk_prefix: String,
    pub limit: Option<usize>,
    /// Scan from the highest sort key down
    pub reverse: bool,
}

impl PrefixQuery {
    pub fn new(sk_prefix: impl Into<String>) -> Self {
        Self {
            sk_prefix: sk_prefix.into(),
            limit: None,
            reverse: false,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError>;

    /// Insert or overwrite one item.
    async fn put(&self, item: Item) -> Result<(), StoreError>;

    /// Deleting a missing item is not an error.
    async fn delete(&self, pk: &str, sk: &str) -> Result<(), StoreError>;

    async fn query_prefix(&self, pk: &str, query: &PrefixQuery) -> Result<Vec<Item>, StoreError>;

    /// Write all items or none.
    async fn transact_put(&self, items: Vec<Item>) -> Result<(), StoreError>;
}
