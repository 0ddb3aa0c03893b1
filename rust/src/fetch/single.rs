use std::fmt;
use std::future::Future;

use super::{FetchCell, FetchOutcome, FetchState, Liveness};
use crate::envelope::{settle, Envelope};

pub struct SingleFetch<T, F> {
    cell: FetchCell<T>,
    source: F,
}

impl<T: fmt::Debug, F> fmt::Debug for SingleFetch<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFetch").field("cell", &self.cell).finish()
    }
}

impl<T, E, F, Fut> SingleFetch<T, F>
where
    T: Clone,
    E: fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Envelope<T>, E>>,
{
    pub fn new(source: F, liveness: Liveness) -> Self {
        Self {
            cell: FetchCell::new(liveness),
            source,
        }
    }

    pub fn state(&self) -> FetchState<T> {
        self.cell.snapshot()
    }

    /// Fetch again. A trigger arriving while a fetch is in flight is ignored
    /// rather than racing a second request against the same state.
    pub async fn refetch(&self) -> FetchOutcome<T> {
        let Some(_in_flight) = self.cell.try_begin() else {
            tracing::debug!("refetch ignored: already in flight");
            return FetchOutcome::AlreadyInFlight;
        };
        let settled = settle((self.source)().await);
        self.cell.finish(settled)
    }
}
