//! Audio/haptic cues played when a mutation settles.
//!
//! Cues are fire-and-forget: a failing or panicking sink is logged and
//! otherwise ignored, so it can never block or fail the mutation pipeline.

use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackCue {
    Success,
    Failure,
}

pub trait FeedbackSink: Send + Sync {
    fn play(&self, cue: FeedbackCue) -> anyhow::Result<()>;
}

pub fn fire_and_forget(sink: &dyn FeedbackSink, cue: FeedbackCue) {
    match catch_unwind(AssertUnwindSafe(|| sink.play(cue))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(?cue, err = %e, "feedback cue failed"),
        Err(_) => tracing::warn!(?cue, "feedback sink panicked"),
    }
}
