use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CONV_PREFIX: &str = "CONV#";
pub const META_KEY: &str = "META";
pub const MEMBER_PREFIX: &str = "MEMBER#";

/// Conversation metadata; the participant set never changes after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Existence of this record is the sole proof of membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub conversation_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
}

impl Conversation {
    pub fn partition_key(conversation_id: &str) -> String {
        format!("{CONV_PREFIX}{conversation_id}")
    }
}

impl Membership {
    pub fn sort_key(user_id: &str) -> String {
        format!("{MEMBER_PREFIX}{user_id}")
    }

    /// User id back out of a membership sort key
    pub fn user_from_sort_key(sk: &str) -> Option<&str> {
        sk.strip_prefix(MEMBER_PREFIX).filter(|u| !u.is_empty())
    }
}
