use serde::{Deserialize, Serialize};

use crate::temp_id::has_temp_prefix;

/// A domain record plus its (optional) identity. `record` is flattened on the
/// wire, so `{"id": "p7", "name": "Pump 7"}` decodes as
/// `Entity { id: Some("p7"), record: Pump { name: "Pump 7" } }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Entity<T> {
    pub fn new(record: T) -> Self {
        Self { id: None, record }
    }

    pub fn with_id(id: impl Into<String>, record: T) -> Self {
        Self {
            id: Some(id.into()),
            record,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_provisional(&self) -> bool {
        self.id().is_some_and(has_temp_prefix)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    Add,
    Update,
    Delete,
}

/// UI-only bookkeeping for an entry awaiting remote confirmation. Never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingMeta {
    pub kind: PendingKind,
    pub since_ms: i64,
}

/// One entry of an optimistic collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Tracked<T> {
    pub entity: Entity<T>,
    pub pending: Option<PendingMeta>,
}

impl<T> Tracked<T> {
    pub fn confirmed(entity: Entity<T>) -> Self {
        Self {
            entity,
            pending: None,
        }
    }

    pub fn pending(entity: Entity<T>, kind: PendingKind, since_ms: i64) -> Self {
        Self {
            entity,
            pending: Some(PendingMeta { kind, since_ms }),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.entity.id()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// One in-flight, unconfirmed mutation against a collection.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingAction<T> {
    pub kind: PendingKind,
    pub payload: Entity<T>,
    pub temp_id: Option<String>,
}
