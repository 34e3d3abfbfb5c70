pub mod connection;
pub mod conversation;
pub mod delivery;
pub mod message;

pub use connection::ConnectionRecord;
pub use conversation::{Conversation, Membership};
pub use delivery::DeliveryOutcome;
pub use message::{Message, MessageKey, PushEvent, PushedMessage};
