//! Apply-now, confirm-or-rollback primitive for single-entity writes.
//!
//! Ordering within one engine: the optimistic apply happens before the remote
//! call is issued, and commit/rollback happen after it settles. The engine does
//! not serialize overlapping calls; callers disable their trigger while
//! [`OptimisticMutation::is_pending`] is set.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::envelope::{settle, Envelope};
use crate::feedback::{fire_and_forget, FeedbackCue, FeedbackSink};

/// Synchronous callbacks into the consuming UI layer. All optional.
pub struct MutationHooks<'a, T> {
    on_optimistic_update: Option<Box<dyn FnOnce(&T) + 'a>>,
    on_rollback: Option<Box<dyn FnOnce(T) + 'a>>,
    on_success: Option<Box<dyn FnOnce(T) + 'a>>,
    on_error: Option<Box<dyn FnOnce(String) + 'a>>,
}

impl<T> Default for MutationHooks<'_, T> {
    fn default() -> Self {
        Self {
            on_optimistic_update: None,
            on_rollback: None,
            on_success: None,
            on_error: None,
        }
    }
}

impl<'a, T> MutationHooks<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_optimistic_update(mut self, f: impl FnOnce(&T) + 'a) -> Self {
        self.on_optimistic_update = Some(Box::new(f));
        self
    }

    pub fn on_rollback(mut self, f: impl FnOnce(T) + 'a) -> Self {
        self.on_rollback = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(T) + 'a) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(String) + 'a) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// A rejected mutation: the pre-mutation snapshot plus the failure message.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationFailure<T> {
    pub previous: T,
    pub message: String,
}

#[derive(Default)]
pub struct OptimisticMutation {
    pending: AtomicBool,
    error: Mutex<Option<String>>,
    feedback: Option<Arc<dyn FeedbackSink>>,
}

impl fmt::Debug for OptimisticMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticMutation")
            .field("pending", &self.is_pending())
            .field("error", &self.error())
            .finish()
    }
}

struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl OptimisticMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feedback(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(sink);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Message recorded by the most recent failed mutation, cleared when the
    /// next one starts.
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    /// Run `mutation_fn(data)` with the hook protocol. Returns `true` when the
    /// remote write was confirmed.
    ///
    /// Exactly one of `on_success` / `on_error` fires, after the remote call
    /// settles. Hook panics propagate.
    pub async fn mutate<T, E, F, Fut>(
        &self,
        data: T,
        mutation_fn: F,
        hooks: MutationHooks<'_, T>,
    ) -> bool
    where
        T: Clone,
        E: fmt::Display,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<Envelope<T>, E>>,
    {
        let MutationHooks {
            on_optimistic_update,
            on_rollback,
            on_success,
            on_error,
        } = hooks;

        let _guard = self.begin();
        let snapshot = data.clone();
        if let Some(apply) = on_optimistic_update {
            apply(&data);
        }

        match settle(mutation_fn(data.clone()).await) {
            Ok(returned) => {
                if let Some(commit) = on_success {
                    commit(returned.unwrap_or(data));
                }
                self.play(FeedbackCue::Success);
                true
            }
            Err(message) => {
                if let Some(rollback) = on_rollback {
                    rollback(snapshot);
                }
                self.record_failure(&message);
                if let Some(report) = on_error {
                    report(message);
                }
                self.play(FeedbackCue::Failure);
                false
            }
        }
    }

    /// Same protocol as [`mutate`](Self::mutate) for callers that own the state
    /// they update: apply the optimistic change before calling, then act on the
    /// returned value (commit) or failure (rollback).
    pub async fn run<T, E, F, Fut>(&self, data: T, mutation_fn: F) -> Result<T, MutationFailure<T>>
    where
        T: Clone,
        E: fmt::Display,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<Envelope<T>, E>>,
    {
        let _guard = self.begin();
        let snapshot = data.clone();

        match settle(mutation_fn(data).await) {
            Ok(returned) => {
                self.play(FeedbackCue::Success);
                Ok(returned.unwrap_or(snapshot))
            }
            Err(message) => {
                self.record_failure(&message);
                self.play(FeedbackCue::Failure);
                Err(MutationFailure {
                    previous: snapshot,
                    message,
                })
            }
        }
    }

    fn begin(&self) -> PendingGuard<'_> {
        *self.error.lock() = None;
        self.pending.store(true, Ordering::SeqCst);
        PendingGuard(&self.pending)
    }

    fn record_failure(&self, message: &str) {
        tracing::warn!(err = %message, "optimistic mutation rolled back");
        *self.error.lock() = Some(message.to_string());
    }

    fn play(&self, cue: FeedbackCue) {
        if let Some(sink) = self.feedback.as_deref() {
            fire_and_forget(sink, cue);
        }
    }
}
