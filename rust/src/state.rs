use crate::chat::ChatMessage;
use crate::notifications::Notification;

/// Point-in-time copy of everything a [`SyncContext`](crate::SyncContext) holds.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncState {
    pub rev: u64,
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
    pub last_marked_all_read: Option<i64>,
    pub messages: Vec<ChatMessage>,
    pub pending_messages: usize,
    pub last_fetched_at: Option<i64>,
    pub sending: bool,
    pub last_error: Option<String>,
}

impl SyncState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            notifications: vec![],
            unread_count: 0,
            last_marked_all_read: None,
            messages: vec![],
            pending_messages: 0,
            last_fetched_at: None,
            sending: false,
            last_error: None,
        }
    }
}
