//! A remote-backed collection that applies writes locally first.
//!
//! Operations take `&self`, so a refresh may run while a write is in flight.
//! The state lock is never held across a remote call.

use std::fmt;
use std::future::Future;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::{Entity, PendingAction, PendingKind, Tracked};
use crate::envelope::{settle, RemoteResult};
use crate::list;
use crate::mutation::OptimisticMutation;
use crate::remote::HttpRemote;
use crate::temp_id::{generate_temp_id, has_temp_prefix};

/// The create/read/update/delete surface a collection syncs against.
pub trait EntityService<T> {
    fn list(&self) -> impl Future<Output = RemoteResult<Vec<Entity<T>>>> + Send;
    fn create(&self, record: &T) -> impl Future<Output = RemoteResult<Entity<T>>> + Send;
    fn update(&self, id: &str, record: &T) -> impl Future<Output = RemoteResult<Entity<T>>> + Send;
    fn delete(&self, id: &str) -> impl Future<Output = RemoteResult<()>> + Send;
}

/// [`EntityService`] for one named collection on an [`HttpRemote`].
#[derive(Clone, Debug)]
pub struct RemoteCollection {
    remote: HttpRemote,
    collection: String,
}

impl RemoteCollection {
    pub fn new(remote: HttpRemote, collection: impl Into<String>) -> Self {
        Self {
            remote,
            collection: collection.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.collection
    }
}

impl<T> EntityService<T> for RemoteCollection
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn list(&self) -> impl Future<Output = RemoteResult<Vec<Entity<T>>>> + Send {
        self.remote.list(&self.collection)
    }

    fn create(&self, record: &T) -> impl Future<Output = RemoteResult<Entity<T>>> + Send {
        self.remote.create(&self.collection, record)
    }

    fn update(&self, id: &str, record: &T) -> impl Future<Output = RemoteResult<Entity<T>>> + Send {
        self.remote.update(&self.collection, id, record)
    }

    fn delete(&self, id: &str) -> impl Future<Output = RemoteResult<()>> + Send {
        self.remote.delete(&self.collection, id)
    }
}

struct CollectionState<T> {
    items: Vec<Tracked<T>>,
    pending: Vec<PendingAction<T>>,
    error: Option<String>,
}

impl<T> CollectionState<T> {
    fn track(&mut self, kind: PendingKind, payload: Entity<T>, temp_id: Option<String>) {
        self.pending.push(PendingAction {
            kind,
            payload,
            temp_id,
        });
    }

    fn untrack(&mut self, kind: PendingKind, id: &str) {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|a| a.kind == kind && a.payload.id() == Some(id))
        {
            self.pending.remove(pos);
        }
    }

    fn awaits(&self, kind: PendingKind, id: &str) -> bool {
        self.pending
            .iter()
            .any(|a| a.kind == kind && a.payload.id() == Some(id))
    }
}

pub struct OptimisticCollection<T> {
    state: Mutex<CollectionState<T>>,
    engine: OptimisticMutation,
}

impl<T> fmt::Debug for OptimisticCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OptimisticCollection")
            .field("items", &state.items.len())
            .field("pending", &state.pending.len())
            .field("error", &state.error)
            .finish()
    }
}

impl<T> Default for OptimisticCollection<T> {
    fn default() -> Self {
        Self::with_engine(OptimisticMutation::new())
    }
}

/// Replace the entry carrying `entity`'s identity with the server's copy.
fn accept<T: Clone>(items: &[Tracked<T>], entity: Entity<T>) -> Vec<Tracked<T>> {
    items
        .iter()
        .map(|t| {
            if t.id().is_some() && t.id() == entity.id() {
                Tracked::confirmed(entity.clone())
            } else {
                t.clone()
            }
        })
        .collect()
}

/// Put `previous` back unless the entry has since left the optimistic
/// update state (deleted, or replaced by a refresh).
fn restore<T: Clone>(items: &[Tracked<T>], previous: Tracked<T>) -> Vec<Tracked<T>> {
    items
        .iter()
        .map(|t| {
            let mine = t.id() == previous.id()
                && t.pending.map(|p| p.kind) == Some(PendingKind::Update);
            if mine {
                previous.clone()
            } else {
                t.clone()
            }
        })
        .collect()
}

impl<T> OptimisticCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: OptimisticMutation) -> Self {
        Self {
            state: Mutex::new(CollectionState {
                items: vec![],
                pending: vec![],
                error: None,
            }),
            engine,
        }
    }
}

impl<T: Clone> OptimisticCollection<T> {
    pub fn items(&self) -> Vec<Tracked<T>> {
        self.state.lock().items.clone()
    }

    pub fn pending(&self) -> Vec<PendingAction<T>> {
        self.state.lock().pending.clone()
    }

    /// True while any write is awaiting the service.
    pub fn is_pending(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Create `record` remotely, showing it immediately under a provisional
    /// identity.
    pub async fn add<S: EntityService<T>>(&self, service: &S, record: T) -> bool {
        let temp_id = generate_temp_id();
        {
            let mut state = self.state.lock();
            let (next, _) =
                list::optimistic_add(&state.items, Entity::new(record.clone()), &temp_id);
            state.items = next;
            state.error = None;
            state.track(
                PendingKind::Add,
                Entity::with_id(temp_id.clone(), record.clone()),
                Some(temp_id.clone()),
            );
        }

        let outcome = self
            .engine
            .run(Entity::new(record), move |e| async move {
                service.create(&e.record).await
            })
            .await;

        let mut state = self.state.lock();
        state.untrack(PendingKind::Add, &temp_id);
        match outcome {
            Ok(created) => {
                match created.id().map(str::to_string) {
                    Some(real_id) if !has_temp_prefix(&real_id) => {
                        let next = list::confirm_add(&state.items, &temp_id, &real_id);
                        state.items = accept(&next, created);
                        tracing::debug!(%temp_id, %real_id, "add confirmed");
                    }
                    // Left in place; the next refresh brings the server copy.
                    _ => tracing::warn!(%temp_id, "create acknowledged without an identity"),
                }
                true
            }
            Err(failure) => {
                tracing::warn!(%temp_id, err = %failure.message, "add rejected; rolling back");
                state.items = list::rollback_add(&state.items, &temp_id);
                state.error = Some(failure.message);
                false
            }
        }
    }

    /// Returns `false` without contacting the service when `id` is not present.
    pub async fn update<S: EntityService<T>>(&self, service: &S, id: &str, record: T) -> bool {
        let entity = Entity::with_id(id, record);
        let previous = {
            let mut state = self.state.lock();
            let (next, previous) = list::optimistic_update(&state.items, entity.clone());
            let Some(previous) = previous else {
                tracing::debug!(%id, "update ignored: unknown id");
                return false;
            };
            state.items = next;
            state.error = None;
            state.track(PendingKind::Update, entity.clone(), None);
            previous
        };

        let outcome = self
            .engine
            .run(entity, move |e| async move { service.update(id, &e.record).await })
            .await;

        let mut state = self.state.lock();
        state.untrack(PendingKind::Update, id);
        match outcome {
            Ok(mut confirmed) => {
                if confirmed.id().is_none() {
                    confirmed.id = Some(id.to_string());
                }
                state.items = accept(&state.items, confirmed);
                true
            }
            Err(failure) => {
                tracing::warn!(%id, err = %failure.message, "update rejected; restoring");
                state.items = restore(&state.items, previous);
                state.error = Some(failure.message);
                false
            }
        }
    }

    pub async fn remove<S: EntityService<T>>(&self, service: &S, id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let (next, removed) = list::optimistic_delete(&state.items, id);
            let Some(removed) = removed else {
                tracing::debug!(%id, "remove ignored: unknown id");
                return false;
            };
            state.items = next;
            state.error = None;
            state.track(PendingKind::Delete, removed.item.entity.clone(), None);
            removed
        };

        let outcome = self.engine.run((), move |()| service.delete(id)).await;

        let mut state = self.state.lock();
        state.untrack(PendingKind::Delete, id);
        match outcome {
            Ok(()) => true,
            Err(failure) => {
                tracing::warn!(%id, err = %failure.message, "delete rejected; reinserting");
                state.items = list::reinsert(&state.items, removed);
                state.error = Some(failure.message);
                false
            }
        }
    }

    /// Replace confirmed entries with the server's list. Provisional entries
    /// still awaiting their create stay at the front, entries with an update
    /// in flight keep their local value, and entries being deleted stay gone.
    pub async fn refresh<S: EntityService<T>>(&self, service: &S) -> bool {
        let fetched = settle(service.list().await);

        let mut state = self.state.lock();
        let server = match fetched {
            Ok(server) => server.unwrap_or_default(),
            Err(message) => {
                tracing::warn!(err = %message, "refresh failed; keeping current items");
                state.error = Some(message);
                return false;
            }
        };

        let mut next: Vec<Tracked<T>> = state
            .items
            .iter()
            .filter(|t| t.id().is_some_and(|id| state.awaits(PendingKind::Add, id)))
            .cloned()
            .collect();
        for entity in server {
            let Some(id) = entity.id().map(str::to_string) else {
                continue;
            };
            if has_temp_prefix(&id) {
                tracing::warn!(%id, "server sent a provisional id; ignoring entry");
                continue;
            }
            if state.awaits(PendingKind::Delete, &id) || list::find(&next, &id).is_some() {
                continue;
            }
            let local = list::find(&state.items, &id)
                .filter(|_| state.awaits(PendingKind::Update, &id))
                .cloned();
            next.push(local.unwrap_or_else(|| Tracked::confirmed(entity)));
        }

        tracing::debug!(
            items = next.len(),
            in_flight = state.pending.len(),
            "collection refreshed"
        );
        state.items = next;
        state.error = None;
        true
    }
}
