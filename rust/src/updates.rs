use crate::chat::ChatMessage;
use crate::notifications::Notification;

/// Emitted by [`SyncContext`](crate::SyncContext) after every state change.
/// `rev` increases by one per update.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreUpdate {
    NotificationsChanged {
        rev: u64,
        notifications: Vec<Notification>,
        unread_count: u32,
    },
    ChatChanged {
        rev: u64,
        messages: Vec<ChatMessage>,
    },
    Error {
        rev: u64,
        message: String,
    },
}

impl StoreUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            StoreUpdate::NotificationsChanged { rev, .. } => *rev,
            StoreUpdate::ChatChanged { rev, .. } => *rev,
            StoreUpdate::Error { rev, .. } => *rev,
        }
    }

    /// Log-safe tag.
    pub fn tag(&self) -> &'static str {
        match self {
            StoreUpdate::NotificationsChanged { .. } => "NotificationsChanged",
            StoreUpdate::ChatChanged { .. } => "ChatChanged",
            StoreUpdate::Error { .. } => "Error",
        }
    }
}
