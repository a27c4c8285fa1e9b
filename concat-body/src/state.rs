//! Writer lifecycle and error bookkeeping.

use crate::error::BodyError;
use tracing::{debug, warn};

/// State of a [`BodyWriter`](crate::BodyWriter).
///
/// An unopened [`Aggregator`](crate::Aggregator) plays the idle state; opening
/// it produces a writer in `Opening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Sink registered, waiting for it to finish opening.
    Opening,
    /// Pumping bytes into the sink.
    Streaming,
    /// Resources released. Final.
    Closed,
}

impl WriterState {
    /// Check if the state is final.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Holds the first error reported during a run. Later errors are dropped.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    error: Option<BodyError>,
}

impl ErrorSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` unless one is already held. Returns whether it was kept.
    pub fn record(&mut self, error: BodyError) -> bool {
        if let Some(first) = &self.error {
            debug!(first = %first, dropped = %error, "Ignoring error after the first");
            return false;
        }
        warn!(error = %error, "Body aggregation failed");
        self.error = Some(error);
        true
    }

    /// The recorded error.
    #[must_use]
    pub fn get(&self) -> Option<&BodyError> {
        self.error.as_ref()
    }

    /// Check if an error was recorded.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.error.is_some()
    }

    /// Take the recorded error out of the slot.
    pub fn take(&mut self) -> Option<BodyError> {
        self.error.take()
    }
}
