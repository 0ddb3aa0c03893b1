use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;

use super::Liveness;
use crate::envelope::{settle, Envelope};
use crate::remote::RemoteError;

type Source<T, E> = Box<dyn Fn() -> BoxFuture<'static, Result<Envelope<T>, E>> + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub struct ParallelState<K: Eq + Hash, T> {
    /// True until every branch of the current run has settled.
    pub loading: bool,
    pub data: HashMap<K, T>,
    pub errors: HashMap<K, String>,
}

impl<K: Eq + Hash, T> Default for ParallelState<K, T> {
    fn default() -> Self {
        Self {
            loading: false,
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }
}

/// Fan out to several independently keyed sources and combine the results.
///
/// One failing source never prevents the others from populating. Each run
/// takes a token; results from a run that has been superseded (or that finish
/// after teardown) are dropped.
pub struct ParallelFetch<K: Eq + Hash, T, E = RemoteError> {
    sources: Vec<(K, Source<T, E>)>,
    state: Mutex<ParallelState<K, T>>,
    run_token: AtomicU64,
    liveness: Liveness,
}

impl<K, T, E> fmt::Debug for ParallelFetch<K, T, E>
where
    K: Eq + Hash + fmt::Debug,
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelFetch")
            .field("keys", &self.sources.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl<K, T, E> ParallelFetch<K, T, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Clone,
    E: fmt::Display,
{
    pub fn new(liveness: Liveness) -> Self {
        Self {
            sources: Vec::new(),
            state: Mutex::new(ParallelState::default()),
            run_token: AtomicU64::new(0),
            liveness,
        }
    }

    pub fn source<F, Fut>(mut self, key: K, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Envelope<T>, E>> + Send + 'static,
    {
        let source: Source<T, E> = Box::new(move || fetch().boxed());
        self.sources.push((key, source));
        self
    }

    pub fn state(&self) -> ParallelState<K, T> {
        self.state.lock().clone()
    }

    /// Run every source concurrently and wait for all of them. Call again when
    /// the inputs change; an older run still in flight is superseded.
    pub async fn run(&self) -> ParallelState<K, T> {
        let token = self.run_token.fetch_add(1, Ordering::SeqCst) + 1;
        if self.liveness.is_alive() {
            self.state.lock().loading = true;
        }

        let settled = join_all(self.sources.iter().map(|(key, fetch)| {
            let key = key.clone();
            fetch().map(move |outcome| (key, settle(outcome)))
        }))
        .await;

        if !self.liveness.is_alive() {
            tracing::debug!("parallel fetch finished after teardown; discarded");
            return self.state();
        }
        if self.run_token.load(Ordering::SeqCst) != token {
            tracing::debug!(token, "parallel fetch superseded by a newer run; discarded");
            return self.state();
        }

        let mut next = ParallelState {
            loading: false,
            ..ParallelState::default()
        };
        for (key, result) in settled {
            match result {
                Ok(Some(data)) => {
                    next.data.insert(key, data);
                }
                Ok(None) => {}
                Err(message) => {
                    tracing::warn!(?key, err = %message, "parallel fetch branch failed");
                    next.errors.insert(key, message);
                }
            }
        }
        *self.state.lock() = next.clone();
        next
    }
}
