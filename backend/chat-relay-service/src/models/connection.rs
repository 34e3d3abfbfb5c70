use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const USER_PREFIX: &str = "USER#";
pub const CONN_PREFIX: &str = "CONN#";

/// One live, authenticated session of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub user_id: String,
    pub connection_id: String,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn partition_key(user_id: &str) -> String {
        format!("{USER_PREFIX}{user_id}")
    }

    pub fn sort_key(connection_id: &str) -> String {
        format!("{CONN_PREFIX}{connection_id}")
    }
}
