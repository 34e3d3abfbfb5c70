use crate::error::{AppError, AppResult};
use crate::models::conversation::{MEMBER_PREFIX, META_KEY};
use crate::models::message::MSG_PREFIX;
use crate::models::{Conversation, Membership, Message, MessageKey};
use crate::store::{Item, KvStore, PrefixQuery};
use chrono::Utc;
use error_types::error_codes;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 200;

/// Owns conversation metadata, membership records and message history.
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KvStore>,
    system_caller_id: Arc<str>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KvStore>, system_caller_id: &str) -> Self {
        Self {
            store,
            system_caller_id: Arc::from(system_caller_id),
        }
    }

    /// Create a two-party conversation.
    ///
    /// Only the system caller may do this. Metadata and both membership
    /// records are written in one transaction; every check runs before it.
    pub async fn create_conversation(
        &self,
        caller_id: &str,
        participant_a: &str,
        participant_b: &str,
    ) -> AppResult<Conversation> {
        if caller_id != &*self.system_caller_id {
            tracing::warn!(caller_id = %caller_id, "conversation creation by non-system caller");
            return Err(AppError::Forbidden {
                code: error_codes::NOT_SYSTEM_CALLER,
                message: "Only the system caller may create conversations",
            });
        }

        let (a, b) = (participant_a.trim(), participant_b.trim());
        if a.is_empty() || b.is_empty() {
            return Err(AppError::bad_request(
                error_codes::PARTICIPANTS_INVALID,
                "participantA and participantB are required",
            ));
        }
        if a == b {
            return Err(AppError::bad_request(
                error_codes::PARTICIPANTS_INVALID,
                "participants must be distinct",
            ));
        }

        let now = Utc::now();
        let conversation = Conversation {
            conversation_id: Uuid::new_v4().to_string(),
            participants: vec![a.to_string(), b.to_string()],
            created_at: now,
        };
        let pk = Conversation::partition_key(&conversation.conversation_id);

        let mut items = Vec::with_capacity(3);
        for user_id in &conversation.participants {
            let membership = Membership {
                conversation_id: conversation.conversation_id.clone(),
                user_id: user_id.clone(),
                joined_at: now,
            };
            items.push(Item::new(&pk, Membership::sort_key(user_id), &membership)?);
        }
        items.push(Item::new(&pk, META_KEY, &conversation)?);

        self.store.transact_put(items).await?;

        tracing::info!(
            conversation_id = %conversation.conversation_id,
            "conversation created"
        );
        Ok(conversation)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> AppResult<Option<Conversation>> {
        let item = self
            .store
            .get(&Conversation::partition_key(conversation_id), META_KEY)
            .await?;
        Ok(item.map(|i| i.decode()).transpose()?)
    }

    pub async fn is_participant(&self, conversation_id: &str, user_id: &str) -> AppResult<bool> {
        let item = self
            .store
            .get(
                &Conversation::partition_key(conversation_id),
                &Membership::sort_key(user_id),
            )
            .await?;
        Ok(item.is_some())
    }

    /// Persist one immutable message keyed by write time.
    ///
    /// Exactly one write per call, no retry.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        sender_user_id: &str,
        text: &str,
    ) -> AppResult<Message> {
        let key = MessageKey::new(Utc::now().timestamp_millis(), rand::random::<u32>());
        let message = Message {
            conversation_id: conversation_id.to_string(),
            message_id: key.message_id(),
            timestamp: key.timestamp,
            sender_user_id: sender_user_id.to_string(),
            text: text.to_string(),
        };

        let item = Item::new(
            Conversation::partition_key(conversation_id),
            key.sort_key(),
            &message,
        )?;
        self.store.put(item).await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.message_id,
            "message appended"
        );
        Ok(message)
    }

    pub async fn list_other_participants(
        &self,
        conversation_id: &str,
        excluding_user_id: &str,
    ) -> AppResult<Vec<String>> {
        let items = self
            .store
            .query_prefix(
                &Conversation::partition_key(conversation_id),
                &PrefixQuery::new(MEMBER_PREFIX),
            )
            .await?;

        Ok(items
            .iter()
            .filter_map(|item| Membership::user_from_sort_key(&item.sk))
            .filter(|user_id| *user_id != excluding_user_id)
            .map(str::to_string)
            .collect())
    }

    /// The most recent `limit` messages, oldest first.
    pub async fn list_messages(&self, conversation_id: &str, limit: usize) -> AppResult<Vec<Message>> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let query = PrefixQuery::new(MSG_PREFIX).reverse().limit(limit);

        let mut items = self
            .store
            .query_prefix(&Conversation::partition_key(conversation_id), &query)
            .await?;
        items.reverse();

        let messages = items
            .iter()
            .map(Item::decode)
            .collect::<Result<Vec<Message>, _>>()?;
        Ok(messages)
    }
}
