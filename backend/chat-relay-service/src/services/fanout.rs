//! Fan-out Engine
//!
//! Persists an outgoing message, then pushes it to every live connection of
//! every other participant. Persistence decides success; individual pushes
//! may fail without affecting it.

use crate::error::{AppError, AppResult};
use crate::gateway::{PushError, PushGateway};
use crate::models::{DeliveryOutcome, PushEvent};
use crate::services::{ConnectionRegistry, ConversationStore};
use error_types::error_codes;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct FanoutSettings {
    /// Pushes in flight per send
    pub concurrency: usize,
    pub push_timeout: Duration,
    pub max_message_chars: usize,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            concurrency: 16,
            push_timeout: Duration::from_millis(3000),
            max_message_chars: 4096,
        }
    }
}

/// What happened to one push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushResult {
    Delivered,
    StaleRemoved,
    Failed,
}

#[derive(Clone)]
pub struct FanoutEngine {
    conversations: ConversationStore,
    registry: ConnectionRegistry,
    gateway: Arc<dyn PushGateway>,
    settings: FanoutSettings,
}

impl FanoutEngine {
    pub fn new(
        conversations: ConversationStore,
        registry: ConnectionRegistry,
        gateway: Arc<dyn PushGateway>,
        settings: FanoutSettings,
    ) -> Self {
        Self {
            conversations,
            registry,
            gateway,
            settings,
        }
    }

    pub fn settings(&self) -> &FanoutSettings {
        &self.settings
    }

    fn validate(&self, conversation_id: &str, text: &str) -> AppResult<()> {
        if conversation_id.trim().is_empty() {
            return Err(AppError::bad_request(
                error_codes::CONVERSATION_ID_MISSING,
                "conversationId is required",
            ));
        }
        if text.trim().is_empty() {
            return Err(AppError::bad_request(error_codes::MESSAGE_EMPTY, "text is required"));
        }
        if text.chars().count() > self.settings.max_message_chars {
            return Err(AppError::bad_request(
                error_codes::MESSAGE_TOO_LONG,
                format!("text exceeds {} characters", self.settings.max_message_chars),
            ));
        }
        Ok(())
    }

    /// Accept, persist and deliver one message from `sender_user_id`.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender_user_id: &str,
        text: &str,
    ) -> AppResult<DeliveryOutcome> {
        if sender_user_id.is_empty() {
            return Err(AppError::Unauthorized);
        }
        self.validate(conversation_id, text)?;

        if !self
            .conversations
            .is_participant(conversation_id, sender_user_id)
            .await?
        {
            tracing::warn!(
                conversation_id = %conversation_id,
                user_id = %sender_user_id,
                "send rejected: not a participant"
            );
            return Err(AppError::Forbidden {
                code: error_codes::NOT_CONVERSATION_MEMBER,
                message: "Not a participant of this conversation",
            });
        }

        let message = self
            .conversations
            .append_message(conversation_id, sender_user_id, text)
            .await?;

        let mut outcome = DeliveryOutcome {
            conversation_id: conversation_id.to_string(),
            message_id: message.message_id.clone(),
            timestamp: message.timestamp,
            ..DeliveryOutcome::default()
        };

        // From here on the message is accepted; delivery problems are only logged
        let recipients = match self
            .conversations
            .list_other_participants(conversation_id, sender_user_id)
            .await
        {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "failed to list recipients, message stored but not pushed"
                );
                return Ok(outcome);
            }
        };

        let targets = self.resolve_targets(&recipients).await;

        let payload = match serde_json::to_value(PushEvent::new_message(&message)) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode push event");
                return Ok(outcome);
            }
        };

        let results: Vec<PushResult> = stream::iter(targets)
            .map(|(user_id, connection_id)| {
                let payload = &payload;
                async move { self.push_one(&user_id, &connection_id, payload).await }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        outcome.attempted = results.len();
        for result in results {
            match result {
                PushResult::Delivered => outcome.delivered += 1,
                PushResult::StaleRemoved => outcome.stale_removed += 1,
                PushResult::Failed => outcome.failed += 1,
            }
        }

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %outcome.message_id,
            user_id = %sender_user_id,
            attempted = outcome.attempted,
            delivered = outcome.delivered,
            stale_removed = outcome.stale_removed,
            failed = outcome.failed,
            "message fanned out"
        );
        Ok(outcome)
    }

    /// `(userId, connectionId)` for every live connection of `recipients`.
    async fn resolve_targets(&self, recipients: &[String]) -> Vec<(String, String)> {
        let mut targets = Vec::new();
        for user_id in recipients {
            match self.registry.resolve_connections(user_id).await {
                Ok(connections) => targets.extend(
                    connections
                        .into_iter()
                        .map(|connection_id| (user_id.clone(), connection_id)),
                ),
                Err(e) => tracing::error!(
                    user_id = %user_id,
                    error = %e,
                    "failed to resolve connections, skipping recipient"
                ),
            }
        }
        targets
    }

    async fn push_one(&self, user_id: &str, connection_id: &str, payload: &Value) -> PushResult {
        let pushed = timeout(
            self.settings.push_timeout,
            self.gateway.post_to_connection(connection_id, payload),
        )
        .await;

        match pushed {
            Ok(Ok(())) => PushResult::Delivered,
            Ok(Err(PushError::Gone)) => {
                tracing::info!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    "connection gone, removing stale record"
                );
                match self.registry.deregister(user_id, connection_id).await {
                    Ok(()) => PushResult::StaleRemoved,
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            error = %e,
                            "failed to remove stale connection"
                        );
                        PushResult::Failed
                    }
                }
            }
            Ok(Err(PushError::Transport(e))) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "push failed");
                PushResult::Failed
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    timeout_ms = self.settings.push_timeout.as_millis() as u64,
                    "push timed out"
                );
                PushResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// Records every push; ids in `gone` answer `Gone`, ids in `slow` never answer.
    #[derive(Default)]
    struct RecordingGateway {
        pushes: Mutex<Vec<(String, Value)>>,
        gone: HashSet<String>,
        slow: HashSet<String>,
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn post_to_connection(&self, connection_id: &str, payload: &Value) -> Result<(), PushError> {
            if self.slow.contains(connection_id) {
                futures::future::pending::<()>().await;
            }
            if self.gone.contains(connection_id) {
                return Err(PushError::Gone);
            }
            self.pushes
                .lock()
                .await
                .push((connection_id.to_string(), payload.clone()));
            Ok(())
        }
    }

    struct Fixture {
        engine: FanoutEngine,
        conversations: ConversationStore,
        registry: ConnectionRegistry,
        gateway: Arc<RecordingGateway>,
    }

    fn fixture(gateway: RecordingGateway) -> Fixture {
        let conversations = ConversationStore::new(Arc::new(MemoryStore::new()), "system");
        let registry = ConnectionRegistry::new(Arc::new(MemoryStore::new()));
        let gateway = Arc::new(gateway);
        let settings = FanoutSettings {
            push_timeout: Duration::from_millis(50),
            max_message_chars: 10,
            ..FanoutSettings::default()
        };
        Fixture {
            engine: FanoutEngine::new(
                conversations.clone(),
                registry.clone(),
                gateway.clone(),
                settings,
            ),
            conversations,
            registry,
            gateway,
        }
    }

    async fn conversation(f: &Fixture) -> String {
        f.conversations
            .create_conversation("system", "alice", "bob")
            .await
            .unwrap()
            .conversation_id
    }

    #[tokio::test]
    async fn test_pushes_to_recipient_never_to_sender() {
        let f = fixture(RecordingGateway::default());
        let id = conversation(&f).await;
        f.registry.register("alice", "alice-phone").await.unwrap();
        f.registry.register("bob", "bob-phone").await.unwrap();
        f.registry.register("bob", "bob-laptop").await.unwrap();

        let outcome = f.engine.send(&id, "alice", "hello").await.unwrap();

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.delivered, 2);
        let pushes = f.gateway.pushes.lock().await;
        let targets: HashSet<_> = pushes.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(targets, HashSet::from(["bob-phone", "bob-laptop"]));
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_write() {
        let f = fixture(RecordingGateway::default());
        let id = conversation(&f).await;

        for (conv, text) in [("", "hi"), (id.as_str(), "   "), (id.as_str(), "way too long text")] {
            let err = f.engine.send(conv, "alice", text).await.unwrap_err();
            assert_eq!(err.status_code(), 400);
        }
        assert!(f.conversations.list_messages(&id, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gone_connection_is_removed_from_registry() {
        let f = fixture(RecordingGateway {
            gone: HashSet::from(["bob-old".to_string()]),
            ..RecordingGateway::default()
        });
        let id = conversation(&f).await;
        f.registry.register("bob", "bob-old").await.unwrap();
        f.registry.register("bob", "bob-new").await.unwrap();

        let outcome = f.engine.send(&id, "alice", "hi").await.unwrap();

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.stale_removed, 1);
        assert_eq!(f.registry.resolve_connections("bob").await.unwrap(), vec!["bob-new"]);
        let pushes = f.gateway.pushes.lock().await;
        assert_eq!(pushes[0].1["type"], "new-message");
        assert_eq!(pushes[0].1["message"]["text"], "hi");
        assert_eq!(pushes[0].1["message"]["senderUserId"], "alice");
    }

    #[tokio::test]
    async fn test_non_participant_cannot_send() {
        let f = fixture(RecordingGateway::default());
        let id = conversation(&f).await;

        let err = f.engine.send(&id, "mallory", "hi").await.unwrap_err();

        assert_eq!(err.status_code(), 403);
        assert!(f.conversations.list_messages(&id, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_push_times_out_without_blocking_others() {
        let f = fixture(RecordingGateway {
            slow: HashSet::from(["bob-stuck".to_string()]),
            ..RecordingGateway::default()
        });
        let id = conversation(&f).await;
        f.registry.register("bob", "bob-stuck").await.unwrap();
        f.registry.register("bob", "bob-ok").await.unwrap();

        let outcome = f.engine.send(&id, "alice", "ping").await.unwrap();

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 1);
        // A timeout is not proof the session is gone
        assert_eq!(f.registry.resolve_connections("bob").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_recipient_without_connections_still_succeeds() {
        let f = fixture(RecordingGateway::default());
        let id = conversation(&f).await;

        let outcome = f.engine.send(&id, "bob", "anyone?").await.unwrap();

        assert_eq!(outcome.attempted, 0);
        assert_eq!(f.conversations.list_messages(&id, 50).await.unwrap().len(), 1);
    }
}
