use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames a client may send over a hosted session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum WsInboundFrame {
    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
}

/// Frames the server sends back in reply to an inbound frame.
///
/// Pushed `new-message` events are written as-is and are not part of this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundFrame {
    #[serde(rename = "send-result")]
    SendResult { status: u16, body: Value },
}

impl WsInboundFrame {
    /// `None` for anything that is not a known action; such frames are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
