//! Optimistic add/update/delete over an ordered collection.
//!
//! Every function takes the current collection by reference and returns a new
//! one, so "current vs previous" comparisons stay well-defined. Confirmation is
//! idempotent: confirming an identity that is not present leaves the
//! collection unchanged. At most one entry carries a given identity at any
//! time.

use crate::clock::now_millis;
use crate::entity::{Entity, PendingKind, Tracked};
use crate::temp_id::has_temp_prefix;

/// Restores the collection as it was before an [`optimistic_add`].
#[derive(Clone, Debug, PartialEq)]
pub struct AddRollback<T> {
    temp_id: String,
    previous: Vec<Tracked<T>>,
}

impl<T> AddRollback<T> {
    pub fn temp_id(&self) -> &str {
        &self.temp_id
    }

    pub fn restore(self) -> Vec<Tracked<T>> {
        self.previous
    }
}

/// An entry taken out by [`optimistic_delete`], with its original position.
#[derive(Clone, Debug, PartialEq)]
pub struct Removed<T> {
    pub index: usize,
    pub item: Tracked<T>,
}

pub fn find<'a, T>(items: &'a [Tracked<T>], id: &str) -> Option<&'a Tracked<T>> {
    items.iter().find(|t| t.id() == Some(id))
}

fn contains<T>(items: &[Tracked<T>], id: &str) -> bool {
    find(items, id).is_some()
}

/// Prepend `entity` under `temp_id`, marked pending.
pub fn optimistic_add<T: Clone>(
    items: &[Tracked<T>],
    mut entity: Entity<T>,
    temp_id: &str,
) -> (Vec<Tracked<T>>, AddRollback<T>) {
    entity.id = Some(temp_id.to_string());
    let mut next = Vec::with_capacity(items.len() + 1);
    next.push(Tracked::pending(entity, PendingKind::Add, now_millis()));
    next.extend(items.iter().filter(|t| t.id() != Some(temp_id)).cloned());
    (
        next,
        AddRollback {
            temp_id: temp_id.to_string(),
            previous: items.to_vec(),
        },
    )
}

/// Drop the provisional entry created under `temp_id`. Harmless when it is
/// already gone, so a rollback requested twice is a no-op.
pub fn rollback_add<T: Clone>(items: &[Tracked<T>], temp_id: &str) -> Vec<Tracked<T>> {
    items
        .iter()
        .filter(|t| t.id() != Some(temp_id))
        .cloned()
        .collect()
}

/// Replace the entry whose identity matches `updated.id`, marking it pending.
/// Returns the previous value of that entry, or the collection unchanged and
/// `None` when nothing matches.
pub fn optimistic_update<T: Clone>(
    items: &[Tracked<T>],
    updated: Entity<T>,
) -> (Vec<Tracked<T>>, Option<Tracked<T>>) {
    let Some(id) = updated.id.clone() else {
        return (items.to_vec(), None);
    };
    let Some(position) = items.iter().position(|t| t.id() == Some(id.as_str())) else {
        return (items.to_vec(), None);
    };

    let mut next = items.to_vec();
    let previous = std::mem::replace(
        &mut next[position],
        Tracked::pending(updated, PendingKind::Update, now_millis()),
    );
    (next, Some(previous))
}

pub fn optimistic_delete<T: Clone>(
    items: &[Tracked<T>],
    id: &str,
) -> (Vec<Tracked<T>>, Option<Removed<T>>) {
    let Some(index) = items.iter().position(|t| t.id() == Some(id)) else {
        return (items.to_vec(), None);
    };
    let mut next = items.to_vec();
    let item = next.remove(index);
    (next, Some(Removed { index, item }))
}

/// Put a deleted entry back where it was. No-op if its identity reappeared
/// in the meantime.
pub fn reinsert<T: Clone>(items: &[Tracked<T>], removed: Removed<T>) -> Vec<Tracked<T>> {
    if let Some(id) = removed.item.id() {
        if contains(items, id) {
            return items.to_vec();
        }
    }
    let mut next = items.to_vec();
    let index = removed.index.min(next.len());
    next.insert(index, removed.item);
    next
}

/// Promote the provisional entry `temp_id` to the server identity `real_id`
/// and clear its pending flag.
///
/// If an entry with `real_id` is already present (a refresh got there
/// first), the provisional copy is dropped instead of renamed.
pub fn confirm_add<T: Clone>(
    items: &[Tracked<T>],
    temp_id: &str,
    real_id: &str,
) -> Vec<Tracked<T>> {
    if !contains(items, temp_id) {
        return items.to_vec();
    }
    if has_temp_prefix(real_id) {
        tracing::warn!(%temp_id, %real_id, "refusing provisional id as a confirmed identity");
        return items.to_vec();
    }
    if contains(items, real_id) {
        return rollback_add(items, temp_id);
    }

    items
        .iter()
        .map(|t| {
            if t.id() == Some(temp_id) {
                let mut entity = t.entity.clone();
                entity.id = Some(real_id.to_string());
                Tracked::confirmed(entity)
            } else {
                t.clone()
            }
        })
        .collect()
}

pub fn confirm_update<T: Clone>(items: &[Tracked<T>], id: &str) -> Vec<Tracked<T>> {
    items
        .iter()
        .map(|t| {
            if t.id() == Some(id) && t.is_pending() {
                Tracked::confirmed(t.entity.clone())
            } else {
                t.clone()
            }
        })
        .collect()
}
