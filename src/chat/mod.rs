pub mod service;
pub mod unread;

pub use service::{BroadcastOutcome, ChatService, Correspondent, InboxEntry, SendOutcome};
