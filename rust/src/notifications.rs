//! Notification list with a short anti-flicker window after "mark all as read".
//!
//! Marking everything read is local-first, but the periodic refresh may still
//! report the old unread state for a moment. For [`MARK_ALL_READ_GUARD_MS`]
//! after the bulk mark, refreshed notifications that were already read
//! locally (or that predate the mark and are unknown locally) stay read.
//! Outside the window the server's list is taken verbatim.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

pub const MARK_ALL_READ_GUARD_MS: i64 = 3_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl Notification {
    pub fn new(id: impl Into<String>, read: bool) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            message: String::new(),
            kind: String::new(),
            read,
            created_at: None,
        }
    }
}

/// Whether local read state currently outranks a refreshed server read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadGuard {
    Normal,
    GuardingUntil(i64),
}

impl ReadGuard {
    pub fn at(last_marked_all_read: Option<i64>, now: i64) -> Self {
        match last_marked_all_read {
            Some(marked) if now - marked < MARK_ALL_READ_GUARD_MS => {
                ReadGuard::GuardingUntil(marked + MARK_ALL_READ_GUARD_MS)
            }
            _ => ReadGuard::Normal,
        }
    }
}

pub struct NotificationStore {
    notifications: Vec<Notification>,
    unread_count: u32,
    last_marked_all_read: Option<i64>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("notifications", &self.notifications.len())
            .field("unread_count", &self.unread_count)
            .field("last_marked_all_read", &self.last_marked_all_read)
            .finish()
    }
}

fn count_unread(notifications: &[Notification]) -> u32 {
    notifications.iter().filter(|n| !n.read).count() as u32
}

impl NotificationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            notifications: vec![],
            unread_count: 0,
            last_marked_all_read: None,
            clock,
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn last_marked_all_read(&self) -> Option<i64> {
        self.last_marked_all_read
    }

    pub fn guard(&self) -> ReadGuard {
        ReadGuard::at(self.last_marked_all_read, self.clock.now_millis())
    }

    fn replace(&mut self, notifications: Vec<Notification>) {
        self.unread_count = count_unread(&notifications);
        self.notifications = notifications;
    }

    /// Accept a refreshed list from the server.
    pub fn set_notifications(&mut self, incoming: Vec<Notification>) {
        let ReadGuard::GuardingUntil(until) = self.guard() else {
            self.replace(incoming);
            return;
        };
        let Some(marked_at) = self.last_marked_all_read else {
            self.replace(incoming);
            return;
        };

        let local_read: HashMap<&str, bool> = self
            .notifications
            .iter()
            .map(|n| (n.id.as_str(), n.read))
            .collect();
        let mut overridden = 0usize;
        let merged: Vec<Notification> = incoming
            .into_iter()
            .map(|mut n| {
                let keep_read = match local_read.get(n.id.as_str()) {
                    Some(read) => *read,
                    None => n.created_at.map_or(true, |t| t <= marked_at),
                };
                if !n.read && keep_read {
                    n.read = true;
                    overridden += 1;
                }
                n
            })
            .collect();

        if overridden > 0 {
            tracing::debug!(overridden, until, "kept local read state over stale refresh");
        }
        self.replace(merged);
    }

    pub fn mark_all_as_read(&mut self) {
        let notifications = self
            .notifications
            .iter()
            .cloned()
            .map(|mut n| {
                n.read = true;
                n
            })
            .collect();
        self.replace(notifications);
        self.last_marked_all_read = Some(self.clock.now_millis());
    }

    /// Put back a list and bulk-mark stamp taken before a rejected write.
    pub fn restore(
        &mut self,
        notifications: Vec<Notification>,
        last_marked_all_read: Option<i64>,
    ) {
        self.replace(notifications);
        self.last_marked_all_read = last_marked_all_read;
    }

    /// Returns `false` when `id` is unknown.
    pub fn mark_as_read(&mut self, id: &str) -> bool {
        if !self.notifications.iter().any(|n| n.id == id) {
            return false;
        }
        let notifications = self
            .notifications
            .iter()
            .cloned()
            .map(|mut n| {
                if n.id == id {
                    n.read = true;
                }
                n
            })
            .collect();
        self.replace(notifications);
        true
    }

    /// A server push. Replaces the entry with the same identity, otherwise
    /// prepends.
    pub fn add_notification(&mut self, notification: Notification) {
        let mut next = Vec::with_capacity(self.notifications.len() + 1);
        if let Some(pos) = self
            .notifications
            .iter()
            .position(|n| n.id == notification.id)
        {
            next.extend(self.notifications.iter().cloned());
            next[pos] = notification;
        } else {
            next.push(notification);
            next.extend(self.notifications.iter().cloned());
        }
        self.replace(next);
    }

    pub fn remove_notification(&mut self, id: &str) -> bool {
        let before = self.notifications.len();
        let next: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.id != id)
            .cloned()
            .collect();
        let removed = next.len() != before;
        self.replace(next);
        removed
    }

    pub fn clear(&mut self) {
        self.replace(vec![]);
        self.last_marked_all_read = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const T0: i64 = 1_700_000_000_000;

    fn store_at(clock: &ManualClock) -> NotificationStore {
        NotificationStore::new(Arc::new(clock.clone()))
    }

    #[test]
    fn refresh_inside_window_keeps_local_read_state() {
        let clock = ManualClock::at(T0);
        let mut store = store_at(&clock);
        store.set_notifications(vec![Notification::new("n1", false)]);
        assert_eq!(store.unread_count(), 1);

        store.mark_all_as_read();
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.last_marked_all_read(), Some(T0));

        clock.set(T0 + 1_000);
        assert_eq!(store.guard(), ReadGuard::GuardingUntil(T0 + 3_000));
        store.set_notifications(vec![Notification::new("n1", false)]);
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications()[0].read);
    }

    #[test]
    fn refresh_after_window_is_taken_verbatim() {
        let clock = ManualClock::at(T0);
        let mut store = store_at(&clock);
        store.set_notifications(vec![Notification::new("n1", false)]);
        store.mark_all_as_read();

        clock.set(T0 + 4_000);
        assert_eq!(store.guard(), ReadGuard::Normal);
        store.set_notifications(vec![Notification::new("n1", false)]);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn window_boundary_is_exclusive() {
        assert_eq!(
            ReadGuard::at(Some(T0), T0 + 2_999),
            ReadGuard::GuardingUntil(T0 + 3_000)
        );
        assert_eq!(ReadGuard::at(Some(T0), T0 + 3_000), ReadGuard::Normal);
        assert_eq!(ReadGuard::at(None, T0), ReadGuard::Normal);
    }

    #[test]
    fn mark_all_on_empty_store_still_guards_older_unknown_entries() {
        let clock = ManualClock::at(0);
        let mut store = store_at(&clock);
        store.mark_all_as_read();

        clock.set(1_000);
        store.set_notifications(vec![Notification::new("n1", false)]);
        assert_eq!(store.unread_count(), 0);

        clock.set(4_000);
        store.set_notifications(vec![Notification::new("n1", false)]);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn genuinely_new_notification_inside_window_stays_unread() {
        let clock = ManualClock::at(T0);
        let mut store = store_at(&clock);
        store.set_notifications(vec![Notification::new("n1", false)]);
        store.mark_all_as_read();

        clock.set(T0 + 500);
        let mut fresh = Notification::new("n2", false);
        fresh.created_at = Some(T0 + 400);
        store.set_notifications(vec![fresh, Notification::new("n1", false)]);
        assert_eq!(store.unread_count(), 1);
        assert!(!store.notifications()[0].read);
    }

    #[test]
    fn local_unread_push_is_not_overridden() {
        let clock = ManualClock::at(T0);
        let mut store = store_at(&clock);
        store.mark_all_as_read();
        clock.advance(200);
        store.add_notification(Notification::new("alarm-7", false));
        assert_eq!(store.unread_count(), 1);

        clock.advance(200);
        store.set_notifications(vec![Notification::new("alarm-7", false)]);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn count_always_matches_list() {
        let clock = ManualClock::at(T0);
        let mut store = store_at(&clock);
        store.set_notifications(vec![
            Notification::new("a", false),
            Notification::new("b", false),
            Notification::new("c", true),
        ]);
        assert_eq!(store.unread_count(), 2);

        assert!(store.mark_as_read("a"));
        assert!(!store.mark_as_read("zzz"));
        assert_eq!(store.unread_count(), 1);

        store.add_notification(Notification::new("d", false));
        assert_eq!(store.notifications()[0].id, "d");
        assert_eq!(store.unread_count(), 2);

        store.add_notification(Notification::new("d", true));
        assert_eq!(store.notifications().len(), 4);
        assert_eq!(store.unread_count(), 1);

        assert!(store.remove_notification("b"));
        assert_eq!(store.unread_count(), 0);

        store.clear();
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications().is_empty());
        assert_eq!(store.last_marked_all_read(), None);
    }
}
