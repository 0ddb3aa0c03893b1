use std::fmt;
use std::future::Future;
use std::sync::Arc;

use flume::Sender;

use crate::chat::{ChatMessage, ChatStore, OutgoingMessage};
use crate::chat_cache::ChatCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{load_sync_config, SyncConfig};
use crate::envelope::{settle, Envelope};
use crate::feedback::FeedbackSink;
use crate::mutation::OptimisticMutation;
use crate::notifications::{Notification, NotificationStore};
use crate::remote::HttpRemote;
use crate::state::SyncState;
use crate::updates::StoreUpdate;

pub const NOTIFICATIONS_COLLECTION: &str = "notifications";
pub const CHAT_COLLECTION: &str = "chat_messages";

/// Owns the notification and chat stores for one signed-in session and
/// announces every change on `update_sender`.
pub struct SyncContext {
    rev: u64,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    notifications: NotificationStore,
    chat: ChatStore,
    send_engine: OptimisticMutation,
    read_engine: OptimisticMutation,
    last_error: Option<String>,
    update_sender: Sender<StoreUpdate>,
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("rev", &self.rev)
            .field("notifications", &self.notifications)
            .field("chat", &self.chat.messages().len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl SyncContext {
    pub fn new(
        config: SyncConfig,
        clock: Arc<dyn Clock>,
        update_sender: Sender<StoreUpdate>,
    ) -> Self {
        Self::with_chat(config, clock, ChatStore::new(), update_sender)
    }

    /// Load `plantops_config.json` from `data_dir` and restore the chat cache
    /// (unless the config turns it off).
    pub fn open(data_dir: &str, update_sender: Sender<StoreUpdate>) -> Self {
        let config = load_sync_config(data_dir);
        let chat = if config.chat_cache_enabled() {
            match ChatCache::open(data_dir) {
                Ok(cache) => ChatStore::with_cache(cache),
                Err(e) => {
                    tracing::warn!(err = %e, "chat cache unavailable; continuing without it");
                    ChatStore::new()
                }
            }
        } else {
            ChatStore::new()
        };
        Self::with_chat(config, Arc::new(SystemClock), chat, update_sender)
    }

    fn with_chat(
        config: SyncConfig,
        clock: Arc<dyn Clock>,
        chat: ChatStore,
        update_sender: Sender<StoreUpdate>,
    ) -> Self {
        Self {
            rev: 0,
            config,
            notifications: NotificationStore::new(clock.clone()),
            clock,
            chat,
            send_engine: OptimisticMutation::new(),
            read_engine: OptimisticMutation::new(),
            last_error: None,
            update_sender,
        }
    }

    pub fn with_feedback(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.send_engine = OptimisticMutation::new().with_feedback(sink.clone());
        self.read_engine = OptimisticMutation::new().with_feedback(sink);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn rev(&self) -> u64 {
        self.rev
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn chat(&self) -> &ChatStore {
        &self.chat
    }

    pub fn is_sending(&self) -> bool {
        self.send_engine.is_pending()
    }

    pub fn state(&self) -> SyncState {
        SyncState {
            rev: self.rev,
            notifications: self.notifications.notifications().to_vec(),
            unread_count: self.notifications.unread_count(),
            last_marked_all_read: self.notifications.last_marked_all_read(),
            messages: self.chat.messages().to_vec(),
            pending_messages: self.chat.pending_count(),
            last_fetched_at: self.chat.last_fetched_at(),
            sending: self.is_sending(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn apply_notifications(&mut self, incoming: Vec<Notification>) {
        self.notifications.set_notifications(incoming);
        self.emit_notifications();
    }

    pub fn push_notification(&mut self, notification: Notification) {
        self.notifications.add_notification(notification);
        self.emit_notifications();
    }

    pub fn mark_all_notifications_read(&mut self) {
        self.notifications.mark_all_as_read();
        self.emit_notifications();
    }

    /// Mark everything read locally, then persist each previously unread entry
    /// with `write_fn`. The first rejected write restores the list and the
    /// bulk-mark stamp and stops.
    pub async fn mark_all_notifications_read_with<F, Fut, E>(&mut self, write_fn: F) -> bool
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Envelope<Notification>, E>>,
        E: fmt::Display,
    {
        let previous = self.notifications.notifications().to_vec();
        let previous_marked = self.notifications.last_marked_all_read();
        let unread: Vec<String> = previous
            .iter()
            .filter(|n| !n.read)
            .map(|n| n.id.clone())
            .collect();
        self.mark_all_notifications_read();

        for id in unread {
            let outcome = self
                .read_engine
                .run(id, |id| {
                    let write = write_fn(id);
                    async move { write.await.map(|env| env.map(|n| n.id)) }
                })
                .await;
            if let Err(failure) = outcome {
                tracing::warn!(
                    id = %failure.previous,
                    err = %failure.message,
                    "mark all read rejected; restoring"
                );
                self.notifications.restore(previous, previous_marked);
                self.emit_notifications();
                self.raise(failure.message);
                return false;
            }
        }
        self.last_error = None;
        true
    }

    pub fn mark_notification_read(&mut self, id: &str) -> bool {
        if !self.notifications.mark_as_read(id) {
            return false;
        }
        self.emit_notifications();
        true
    }

    pub fn apply_chat_history(&mut self, server: Vec<ChatMessage>) {
        self.chat.set_messages(server);
        self.chat.mark_fetched(self.clock.now_millis());
        self.emit_chat();
    }

    /// Append `text` as an optimistic message, hand it to `send_fn`, then swap
    /// in the acknowledged copy or take the message back out.
    pub async fn send_chat_message<F, Fut, E>(
        &mut self,
        sender: &str,
        text: &str,
        send_fn: F,
    ) -> bool
    where
        F: FnOnce(OutgoingMessage) -> Fut,
        Fut: Future<Output = Result<Envelope<ChatMessage>, E>>,
        E: fmt::Display,
    {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("send_chat_message: empty text");
            return false;
        }

        let composed = ChatStore::compose(sender, text, self.clock.now_millis());
        let optimistic = self.chat.add_optimistic_message(composed);
        let temp_id = optimistic.id.clone();
        self.emit_chat();

        let outcome = self
            .send_engine
            .run(optimistic, |m| send_fn(OutgoingMessage::from(m)))
            .await;

        match outcome {
            Ok(acked) if acked.is_optimistic() => {
                tracing::debug!(%temp_id, "send acknowledged without a message; awaiting history");
                self.last_error = None;
                true
            }
            Ok(acked) => {
                self.last_error = None;
                self.chat.confirm_message(&temp_id, acked);
                self.emit_chat();
                true
            }
            Err(failure) => {
                tracing::warn!(%temp_id, err = %failure.message, "send failed; removing message");
                self.chat.remove_message(&temp_id);
                self.emit_chat();
                self.raise(failure.message);
                false
            }
        }
    }

    /// Pull the notification list from `remote` and apply it.
    pub async fn refresh_notifications(&mut self, remote: &HttpRemote) -> bool {
        match settle(remote.list(NOTIFICATIONS_COLLECTION).await) {
            Ok(list) => {
                self.last_error = None;
                self.apply_notifications(list.unwrap_or_default());
                true
            }
            Err(message) => {
                self.raise(message);
                false
            }
        }
    }

    pub async fn refresh_chat(&mut self, remote: &HttpRemote) -> bool {
        match settle(remote.list(CHAT_COLLECTION).await) {
            Ok(list) => {
                self.last_error = None;
                self.apply_chat_history(list.unwrap_or_default());
                true
            }
            Err(message) => {
                self.raise(message);
                false
            }
        }
    }

    /// [`mark_all_notifications_read_with`](Self::mark_all_notifications_read_with)
    /// as `PUT <collection>/<id>` with `{"read": true}`.
    pub async fn mark_all_notifications_read_via(&mut self, remote: &HttpRemote) -> bool {
        self.mark_all_notifications_read_with(|id| async move {
            let body = serde_json::json!({ "read": true });
            remote.update(NOTIFICATIONS_COLLECTION, &id, &body).await
        })
        .await
    }

    /// [`send_chat_message`](Self::send_chat_message) over `remote`, as the
    /// configured actor.
    pub async fn send_chat_via(&mut self, remote: &HttpRemote, text: &str) -> bool {
        let sender = remote
            .actor_id()
            .or(self.config.actor_id.as_deref())
            .unwrap_or("anonymous")
            .to_string();
        self.send_chat_message(&sender, text, |out| async move {
            remote.create(CHAT_COLLECTION, &out).await
        })
        .await
    }

    fn raise(&mut self, message: String) {
        self.last_error = Some(message.clone());
        let rev = self.next_rev();
        self.emit(StoreUpdate::Error { rev, message });
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.rev
    }

    fn emit(&self, update: StoreUpdate) {
        tracing::trace!(rev = update.rev(), update = update.tag(), "emit");
        let _ = self.update_sender.send(update);
    }

    fn emit_notifications(&mut self) {
        let rev = self.next_rev();
        self.emit(StoreUpdate::NotificationsChanged {
            rev,
            notifications: self.notifications.notifications().to_vec(),
            unread_count: self.notifications.unread_count(),
        });
    }

    fn emit_chat(&mut self) {
        let rev = self.next_rev();
        self.emit(StoreUpdate::ChatChanged {
            rev,
            messages: self.chat.messages().to_vec(),
        });
    }
}
