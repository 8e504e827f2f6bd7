pub mod chat;
pub mod dispatch;
pub mod status;
