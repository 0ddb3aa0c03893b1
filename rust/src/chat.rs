//! Chat history merged with locally sent, not yet confirmed messages.
//!
//! An optimistic message never learns the identity the server will give it,
//! so confirmation is content-based: a server message from the same sender
//! with the same text, timestamped within [`CONFIRM_TOLERANCE_MS`] of the
//! optimistic copy, confirms it. Two distinct identical messages sent inside
//! the tolerance collapse into one until the server reports both.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::chat_cache::{CachedChat, ChatCache};
use crate::temp_id::{generate_temp_id, has_temp_prefix};

pub const CONFIRM_TOLERANCE_MS: u64 = 5_000;

/// What a send puts on the wire. The provisional identity stays local.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub sender: String,
    pub message: String,
    pub timestamp: i64,
}

impl From<ChatMessage> for OutgoingMessage {
    fn from(m: ChatMessage) -> Self {
        Self {
            sender: m.sender,
            message: m.message,
            timestamp: m.timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn is_optimistic(&self) -> bool {
        has_temp_prefix(&self.id)
    }

    /// Whether `self` (a server message) is the confirmed copy of `optimistic`.
    pub fn confirms(&self, optimistic: &ChatMessage) -> bool {
        self.sender == optimistic.sender
            && self.message == optimistic.message
            && self.timestamp.abs_diff(optimistic.timestamp) < CONFIRM_TOLERANCE_MS
    }
}

/// Merge a server history with the optimistic messages held in `current`.
///
/// Result: the server messages plus every optimistic message no server
/// message confirms, ascending by timestamp. Server entries that carry a
/// provisional identity are dropped, as are repeated server identities.
pub fn reconcile(current: &[ChatMessage], server: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut seen = HashSet::new();
    let mut merged: Vec<ChatMessage> = server
        .into_iter()
        .filter(|m| {
            if m.is_optimistic() {
                tracing::warn!(id = %m.id, "server sent a provisional id; ignoring entry");
                return false;
            }
            seen.insert(m.id.clone())
        })
        .collect();

    let unconfirmed: Vec<ChatMessage> = current
        .iter()
        .filter(|m| m.is_optimistic())
        .filter(|m| !merged.iter().any(|s| s.confirms(m)))
        .cloned()
        .collect();
    merged.extend(unconfirmed);
    merged.sort_by_key(|m| m.timestamp);
    merged
}

#[derive(Debug, Default)]
pub struct ChatStore {
    messages: Vec<ChatMessage>,
    last_fetched_at: Option<i64>,
    cache: Option<ChatCache>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from `cache` and keep writing to it.
    pub fn with_cache(cache: ChatCache) -> Self {
        let CachedChat {
            messages,
            last_fetched_at,
        } = cache.load().unwrap_or_else(|e| {
            tracing::warn!(err = %e, "chat cache unreadable; starting empty");
            CachedChat::default()
        });
        tracing::info!(restored = messages.len(), "chat store restored from cache");
        Self {
            messages,
            last_fetched_at,
            cache: Some(cache),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_fetched_at(&self) -> Option<i64> {
        self.last_fetched_at
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_optimistic()).count()
    }

    /// Build an optimistic message with a fresh provisional identity.
    pub fn compose(sender: &str, text: &str, timestamp: i64) -> ChatMessage {
        ChatMessage {
            id: generate_temp_id(),
            sender: sender.to_string(),
            message: text.to_string(),
            timestamp,
        }
    }

    /// Append a locally authored message. A message without the provisional
    /// prefix is given a fresh provisional identity first. Returns the stored copy.
    pub fn add_optimistic_message(&mut self, mut message: ChatMessage) -> ChatMessage {
        if !message.is_optimistic() {
            message.id = generate_temp_id();
        }
        let mut next = self.messages.clone();
        next.push(message.clone());
        self.messages = next;
        self.persist();
        message
    }

    /// Apply a history refresh from the server.
    pub fn set_messages(&mut self, server: Vec<ChatMessage>) {
        let next = reconcile(&self.messages, server);
        let dropped = self
            .pending_count()
            .saturating_sub(next.iter().filter(|m| m.is_optimistic()).count());
        if dropped > 0 {
            tracing::debug!(confirmed = dropped, "optimistic messages confirmed by history");
        }
        self.messages = next;
        self.persist();
    }

    /// Swap the send acknowledgement `confirmed` in for the optimistic copy
    /// `temp_id`. If a refresh already delivered `confirmed`, the optimistic
    /// copy is just dropped.
    pub fn confirm_message(&mut self, temp_id: &str, confirmed: ChatMessage) {
        if confirmed.is_optimistic() {
            tracing::warn!(id = %confirmed.id, "send acknowledged with a provisional id; ignoring");
            return;
        }
        let mut next: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.id != temp_id)
            .cloned()
            .collect();
        if !next.iter().any(|m| m.id == confirmed.id) {
            next.push(confirmed);
            next.sort_by_key(|m| m.timestamp);
        }
        self.messages = next;
        self.persist();
    }

    /// Drop a message (e.g. a failed send). Returns `false` when absent.
    pub fn remove_message(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages = self
            .messages
            .iter()
            .filter(|m| m.id != id)
            .cloned()
            .collect();
        let removed = self.messages.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn mark_fetched(&mut self, at: i64) {
        self.last_fetched_at = Some(at);
        self.persist();
    }

    pub fn clear(&mut self) {
        self.messages = vec![];
        self.last_fetched_at = None;
        self.persist();
    }

    // Best effort: a cache failure never fails a store operation.
    fn persist(&mut self) {
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        if let Err(e) = cache.save(&self.messages, self.last_fetched_at) {
            tracing::warn!(err = %e, "failed to persist chat cache");
        }
    }
}
