//! The buffered pump and its notification-driven state machine.
//!
//! A [`BodyWriter`] owns the aggregate reader, the pump buffer and the sink.
//! Each notification goes through [`BodyWriter::handle_readiness`]:
//!
//! - `OpenCompleted` opens the first source and primes the buffer.
//! - `HasSpaceAvailable` drains buffered bytes into the sink, refilling once
//!   the buffer is at most half full, and closes when nothing is left.
//! - `EndEncountered` and `ErrorOccurred` close immediately.
//!
//! Closing releases the sink and every open source. The first error raised
//! along the way is kept for the caller to inspect afterwards.

use crate::buffer::PumpBuffer;
use crate::config::{AggregatorConfig, LengthCheck};
use crate::error::BodyError;
use crate::reader::{AggregateReader, ReadOutcome};
use crate::sink::{Reaction, Sink, SinkEvent};
use crate::source::DeclaredLength;
use crate::state::{ErrorSlot, WriterState};
use std::io::ErrorKind;
use tracing::{debug, trace, warn};

/// Streams an aggregated body into a sink, one notification at a time.
#[derive(Debug)]
pub struct BodyWriter<S: Sink> {
    reader: AggregateReader,
    buffer: PumpBuffer,
    sink: Option<S>,
    state: WriterState,
    error: ErrorSlot,
    bytes_written: u64,
    config: AggregatorConfig,
}

impl<S: Sink> BodyWriter<S> {
    pub(crate) fn new(
        reader: AggregateReader,
        buffer: PumpBuffer,
        sink: S,
        config: AggregatorConfig,
    ) -> Self {
        debug!(
            sources = reader.sources().len(),
            declared = %reader.declared_length(),
            capacity = buffer.capacity(),
            "Opening body writer"
        );
        Self {
            reader,
            buffer,
            sink: Some(sink),
            state: WriterState::Opening,
            error: ErrorSlot::new(),
            bytes_written: 0,
            config,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Check if the writer still holds its sink.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.state.is_closed()
    }

    /// Declared total length of the body.
    #[must_use]
    pub fn declared_length(&self) -> DeclaredLength {
        self.reader.declared_length()
    }

    /// First error recorded, if any. Kept after close.
    #[must_use]
    pub fn current_error(&self) -> Option<&BodyError> {
        self.error.get()
    }

    /// Take the recorded error out of the writer.
    pub fn take_error(&mut self) -> Option<BodyError> {
        self.error.take()
    }

    /// Bytes accepted by the sink so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes waiting in the pump buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The sink, until the writer closes.
    #[must_use]
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// Mutable access to the sink, until the writer closes.
    pub fn sink_mut(&mut self) -> Option<&mut S> {
        self.sink.as_mut()
    }

    /// React to a notification from the sink's reactor.
    pub fn handle_readiness(&mut self, event: SinkEvent) -> Reaction {
        if self.state.is_closed() {
            trace!(?event, "Ignoring event on closed writer");
            return Reaction::Closed;
        }

        match event {
            SinkEvent::OpenCompleted => {
                if self.state == WriterState::Opening {
                    self.start();
                }
                Reaction::Continue
            }
            SinkEvent::HasSpaceAvailable => self.on_space_available(),
            SinkEvent::EndEncountered => {
                debug!(
                    bytes_written = self.bytes_written,
                    "Sink reached end of stream"
                );
                self.close();
                Reaction::Closed
            }
            SinkEvent::ErrorOccurred => {
                let error = self
                    .sink
                    .as_mut()
                    .and_then(Sink::take_error)
                    .map_or_else(
                        || BodyError::SinkFailed("sink reported an error".to_string()),
                        BodyError::SinkWrite,
                    );
                self.error.record(error);
                self.close();
                Reaction::Closed
            }
        }
    }

    fn on_space_available(&mut self) -> Reaction {
        if self.state == WriterState::Opening {
            self.start();
        }

        let peer_open = self.sink.as_ref().is_some_and(Sink::is_peer_open);
        if !peer_open {
            if let Some(delay) = self.config.retry.delay() {
                trace!(?delay, "Peer not open yet, deferring write");
                return Reaction::RetryAfter(delay);
            }
        }

        if self.error.is_set() {
            self.close();
            return Reaction::Closed;
        }

        if self.drain_to_sink() {
            return Reaction::Continue;
        }

        if !self.error.is_set() {
            self.check_length();
        }
        self.close();
        Reaction::Closed
    }

    fn start(&mut self) {
        debug!("Sink open, starting body");
        self.state = WriterState::Streaming;
        match self.reader.advance() {
            Ok(_) => {
                self.refill();
            }
            Err(error) => {
                self.error.record(error);
            }
        }
    }

    /// Read from the sources into the free part of the buffer.
    ///
    /// Returns `false` when nothing was added, either because the sources are
    /// exhausted or because one failed.
    fn refill(&mut self) -> bool {
        self.buffer.compact();
        if self.buffer.free() == 0 {
            return true;
        }

        match self.reader.read(self.buffer.spare_mut()) {
            ReadOutcome::Read(0) | ReadOutcome::Exhausted => false,
            ReadOutcome::Read(n) => {
                self.buffer.fill(n);
                true
            }
            ReadOutcome::Failed { read, error } => {
                trace!(discarded = read, "Dropping bytes read before failure");
                self.error.record(error);
                false
            }
        }
    }

    /// Write buffered bytes to the sink in one call.
    ///
    /// Returns whether bytes remain buffered for the next notification.
    fn drain_to_sink(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };

        match sink.write(self.buffer.filled()) {
            Ok(0) => {
                self.error.record(BodyError::SinkClosed);
                false
            }
            Ok(n) => {
                let n = self.buffer.drain(n);
                self.buffer.compact();
                self.bytes_written += n as u64;
                trace!(
                    written = n,
                    buffered = self.buffer.len(),
                    total = self.bytes_written,
                    "Drained to sink"
                );
                if self.buffer.len() <= self.buffer.capacity() / 2 {
                    self.refill();
                }
                !self.buffer.is_empty()
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                trace!("Sink not ready, waiting for next notification");
                true
            }
            Err(e) => {
                self.error.record(BodyError::SinkWrite(e));
                false
            }
        }
    }

    fn check_length(&mut self) {
        let DeclaredLength::Known(declared) = self.reader.declared_length() else {
            return;
        };
        if declared == self.bytes_written {
            return;
        }

        match self.config.length_check {
            LengthCheck::Warn => warn!(
                declared,
                written = self.bytes_written,
                "Body length differs from declared length"
            ),
            LengthCheck::Strict => {
                self.error.record(BodyError::LengthMismatch {
                    declared,
                    written: self.bytes_written,
                });
            }
        }
    }

    /// Record `error` and close.
    pub(crate) fn abort(&mut self, error: BodyError) {
        self.error.record(error);
        self.close();
    }

    /// Release the sink and every open source.
    ///
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        if let Some(mut sink) = self.sink.take() {
            sink.release();
        }
        self.buffer.clear();
        self.reader.reset();
        self.state = WriterState::Closed;
        debug!(
            bytes_written = self.bytes_written,
            failed = self.error.is_set(),
            "Body writer closed"
        );
    }
}

impl<S: Sink> Drop for BodyWriter<S> {
    fn drop(&mut self) {
        self.close();
    }
}
