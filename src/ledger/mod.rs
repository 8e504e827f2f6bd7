//! Conversation ledger: the persisted, ordered log of protocol messages.

pub mod message;
pub mod store;

pub use message::{Message, MessageKind, MessageMetadata};
pub use store::{ConversationLedger, parse_messages};
