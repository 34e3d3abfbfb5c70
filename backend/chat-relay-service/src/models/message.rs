use serde::{Deserialize, Serialize};

pub const MSG_PREFIX: &str = "MSG#";

/// Sort key of one message: write-time millis plus a random suffix
///
/// Zero-padded millis keep lexicographic order chronological; the suffix keeps
/// two writes in the same millisecond apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MessageKey {
    pub timestamp: i64,
    pub suffix: u32,
}

impl MessageKey {
    pub fn new(timestamp: i64, suffix: u32) -> Self {
        Self { timestamp, suffix }
    }

    /// Public message id, e.g. `1718000000000-1a2b3c4d`
    pub fn message_id(&self) -> String {
        format!("{:013}-{:08x}", self.timestamp, self.suffix)
    }

    pub fn sort_key(&self) -> String {
        format!("{MSG_PREFIX}{:013}#{:08x}", self.timestamp, self.suffix)
    }
}

/// Immutable stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub conversation_id: String,
    pub message_id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub sender_user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedMessage {
    pub sender_user_id: String,
    pub text: String,
    pub timestamp: i64,
}

/// Events pushed to live sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    #[serde(rename = "new-message", rename_all = "camelCase")]
    NewMessage {
        conversation_id: String,
        message: PushedMessage,
    },
}

impl PushEvent {
    pub fn new_message(message: &Message) -> Self {
        PushEvent::NewMessage {
            conversation_id: message.conversation_id.clone(),
            message: PushedMessage {
                sender_user_id: message.sender_user_id.clone(),
                text: message.text.clone(),
                timestamp: message.timestamp,
            },
        }
    }
}
