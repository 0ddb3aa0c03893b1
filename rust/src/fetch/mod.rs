//! Read-path coordinators built on the envelope contract.
//!
//! - [`SingleFetch`]: one source, re-entrancy guarded `refetch`.
//! - [`ParallelFetch`]: keyed sources fetched concurrently, per-key errors.
//! - [`LazyFetch`]: never fetches until `execute` is called, returns the value.
//!
//! None of them cancel requests. An in-flight request always completes, but
//! its result is dropped when the consumer's [`Liveness`] has been torn down.

mod lazy;
mod parallel;
mod single;

pub use lazy::LazyFetch;
pub use parallel::{ParallelFetch, ParallelState};
pub use single::SingleFetch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared "still mounted" flag between a consumer and its coordinators.
#[derive(Clone, Debug)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the consumer as gone. Results arriving afterwards are discarded.
    pub fn teardown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchState<T> {
    pub loading: bool,
    pub error: Option<String>,
    pub data: Option<T>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            error: None,
            data: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome<T> {
    Fetched(Option<T>),
    Failed(String),
    /// A fetch was already running; this trigger was ignored.
    AlreadyInFlight,
    /// The consumer was torn down before the response arrived.
    Discarded,
}

impl<T> FetchOutcome<T> {
    pub fn into_data(self) -> Option<T> {
        match self {
            FetchOutcome::Fetched(data) => data,
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FetchOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// State plus in-flight bookkeeping shared by the single and lazy coordinators.
#[derive(Debug)]
struct FetchCell<T> {
    state: Mutex<FetchState<T>>,
    in_flight: AtomicBool,
    liveness: Liveness,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: Clone> FetchCell<T> {
    fn new(liveness: Liveness) -> Self {
        Self {
            state: Mutex::new(FetchState::default()),
            in_flight: AtomicBool::new(false),
            liveness,
        }
    }

    fn snapshot(&self) -> FetchState<T> {
        self.state.lock().clone()
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        if self.liveness.is_alive() {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }
        Some(InFlight(&self.in_flight))
    }

    fn finish(&self, settled: Result<Option<T>, String>) -> FetchOutcome<T> {
        if !self.liveness.is_alive() {
            tracing::debug!("fetch result arrived after teardown; discarded");
            return FetchOutcome::Discarded;
        }
        let mut state = self.state.lock();
        state.loading = false;
        match settled {
            Ok(data) => {
                state.error = None;
                state.data = data.clone();
                FetchOutcome::Fetched(data)
            }
            Err(message) => {
                tracing::warn!(err = %message, "fetch failed");
                state.error = Some(message.clone());
                FetchOutcome::Failed(message)
            }
        }
    }
}
