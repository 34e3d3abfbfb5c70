//! Transport-neutral request handlers.
//!
//! Each handler takes the identity forwarded by the front door (already
//! authenticated, never re-verified) plus the request input, and returns a
//! typed response body or an [`AppError`]. The HTTP routes and the hosted
//! WebSocket session both call into these.

use crate::error::{AppError, AppResult};
use crate::models::Message;
use crate::services::DEFAULT_HISTORY_LIMIT;
use crate::state::AppState;
use error_types::error_codes;
use serde::{Deserialize, Serialize};

/// Trimmed, non-empty value or `None`.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require_user(user_id: Option<&str>) -> AppResult<&str> {
    present(user_id).ok_or(AppError::Unauthorized)
}

fn require_connection(connection_id: Option<&str>) -> AppResult<&str> {
    present(connection_id).ok_or_else(|| {
        AppError::bad_request(error_codes::CONNECTION_ID_MISSING, "connectionId is required")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub message: String,
    pub connection_id: String,
}

/// Session open: record `(userId, connectionId)` in the registry.
pub async fn on_connect(
    state: &AppState,
    user_id: Option<&str>,
    connection_id: Option<&str>,
) -> AppResult<ConnectionResponse> {
    let user_id = require_user(user_id)?;
    let connection_id = require_connection(connection_id)?;

    state.registry.register(user_id, connection_id).await?;

    Ok(ConnectionResponse {
        message: "Connected".to_string(),
        connection_id: connection_id.to_string(),
    })
}

/// Session close: drop the registry record. Unknown records are fine.
pub async fn on_disconnect(
    state: &AppState,
    user_id: Option<&str>,
    connection_id: Option<&str>,
) -> AppResult<ConnectionResponse> {
    let user_id = require_user(user_id)?;
    let connection_id = require_connection(connection_id)?;

    state.registry.deregister(user_id, connection_id).await?;

    Ok(ConnectionResponse {
        message: "Disconnected".to_string(),
        connection_id: connection_id.to_string(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub participant_a: Option<String>,
    #[serde(default)]
    pub participant_b: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    pub conversation_id: String,
    pub message: String,
}

pub async fn create_conversation(
    state: &AppState,
    caller_id: Option<&str>,
    request: CreateConversationRequest,
) -> AppResult<CreateConversationResponse> {
    let caller_id = require_user(caller_id)?;

    let conversation = state
        .conversations
        .create_conversation(
            caller_id,
            request.participant_a.as_deref().unwrap_or_default(),
            request.participant_b.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(CreateConversationResponse {
        conversation_id: conversation.conversation_id,
        message: "Conversation created".to_string(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message: String,
    pub conversation_id: String,
    pub timestamp: i64,
    pub message_id: String,
}

/// Persist and fan out. Partial delivery is not visible to the sender.
pub async fn send_message(
    state: &AppState,
    user_id: Option<&str>,
    request: SendMessageRequest,
) -> AppResult<SendMessageResponse> {
    let user_id = require_user(user_id)?;

    let outcome = state
        .fanout
        .send(
            request.conversation_id.as_deref().unwrap_or_default(),
            user_id,
            request.text.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(SendMessageResponse {
        message: "Message sent".to_string(),
        conversation_id: outcome.conversation_id,
        timestamp: outcome.timestamp,
        message_id: outcome.message_id,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHistoryResponse {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

/// Recent history of a conversation, visible to its participants only.
pub async fn list_messages(
    state: &AppState,
    user_id: Option<&str>,
    conversation_id: &str,
    limit: Option<usize>,
) -> AppResult<MessageHistoryResponse> {
    let user_id = require_user(user_id)?;
    let conversation_id = present(Some(conversation_id)).ok_or_else(|| {
        AppError::bad_request(error_codes::CONVERSATION_ID_MISSING, "conversationId is required")
    })?;

    if !state.conversations.is_participant(conversation_id, user_id).await? {
        return Err(AppError::Forbidden {
            code: error_codes::NOT_CONVERSATION_MEMBER,
            message: "Not a participant of this conversation",
        });
    }

    let messages = state
        .conversations
        .list_messages(conversation_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;

    Ok(MessageHistoryResponse {
        conversation_id: conversation_id.to_string(),
        messages,
    })
}
