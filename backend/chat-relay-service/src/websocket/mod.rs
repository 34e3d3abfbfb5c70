pub mod message_types;

pub use message_types::{WsInboundFrame, WsOutboundFrame};
