use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use super::{FetchCell, FetchOutcome, FetchState, Liveness};
use crate::envelope::{settle, Envelope};

/// Like [`SingleFetch`](super::SingleFetch) but idle until [`execute`](Self::execute)
/// is called, which also hands the value straight back to the caller.
pub struct LazyFetch<A, T, F> {
    cell: FetchCell<T>,
    source: F,
    _arg: PhantomData<fn(A)>,
}

impl<A, T: fmt::Debug, F> fmt::Debug for LazyFetch<A, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFetch").field("cell", &self.cell).finish()
    }
}

impl<A, T, E, F, Fut> LazyFetch<A, T, F>
where
    T: Clone,
    E: fmt::Display,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<Envelope<T>, E>>,
{
    pub fn new(source: F, liveness: Liveness) -> Self {
        Self {
            cell: FetchCell::new(liveness),
            source,
            _arg: PhantomData,
        }
    }

    pub fn state(&self) -> FetchState<T> {
        self.cell.snapshot()
    }

    pub async fn execute(&self, arg: A) -> FetchOutcome<T> {
        let Some(_in_flight) = self.cell.try_begin() else {
            tracing::debug!("lazy fetch ignored: already in flight");
            return FetchOutcome::AlreadyInFlight;
        };
        let settled = settle((self.source)(arg).await);
        self.cell.finish(settled)
    }
}
