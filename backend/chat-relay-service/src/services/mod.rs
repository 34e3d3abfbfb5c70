pub mod connection_registry;
pub mod conversation_store;
pub mod fanout;

pub use connection_registry::ConnectionRegistry;
pub use conversation_store::{ConversationStore, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use fanout::{FanoutEngine, FanoutSettings};
