//! Destination sinks and the notifications that drive them.
//!
//! A writer never polls its sink. Whatever reactor owns the sink delivers
//! [`SinkEvent`]s to [`BodyWriter::handle_readiness`](crate::BodyWriter::handle_readiness)
//! and acts on the returned [`Reaction`]. The [`pipe`] function builds an
//! in-memory sink whose reading half feeds pull-mode consumers.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Readiness notification delivered by a sink's reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkEvent {
    /// The sink finished opening.
    OpenCompleted,
    /// The sink can accept more bytes.
    HasSpaceAvailable,
    /// The consuming side went away.
    EndEncountered,
    /// The sink failed; details come from [`Sink::take_error`].
    ErrorOccurred,
}

/// What the writer wants from its driver after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Still streaming; deliver the next notification when it happens.
    Continue,
    /// Re-deliver the same notification after the delay.
    RetryAfter(Duration),
    /// The writer closed and released the sink.
    Closed,
}

/// Destination of an aggregated body.
pub trait Sink {
    /// Write bytes, returning how many were accepted.
    ///
    /// `Ok(0)` means the sink will not accept more. `WouldBlock` means nothing
    /// was written and the writer should wait for the next notification.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Whether the reading side paired with this sink has finished opening.
    fn is_peer_open(&self) -> bool {
        true
    }

    /// Error behind an [`SinkEvent::ErrorOccurred`] notification.
    fn take_error(&mut self) -> Option<io::Error> {
        None
    }

    /// Stop delivering notifications. Called once, when the writer closes.
    fn release(&mut self) {}
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn is_peer_open(&self) -> bool {
        (**self).is_peer_open()
    }

    fn take_error(&mut self) -> Option<io::Error> {
        (**self).take_error()
    }

    fn release(&mut self) {
        (**self).release();
    }
}

#[derive(Debug)]
struct PipeShared {
    buf: BytesMut,
    capacity: Option<usize>,
    reader_open: bool,
    reader_dropped: bool,
    writer_closed: bool,
}

/// Create a pipe holding at most `capacity` bytes, or unbounded with `None`.
///
/// The reading half starts out not open; see [`PipeReader::open`].
#[must_use]
pub fn pipe(capacity: Option<usize>) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Mutex::new(PipeShared {
        buf: BytesMut::new(),
        capacity,
        reader_open: false,
        reader_dropped: false,
        writer_closed: false,
    }));
    (
        PipeWriter {
            shared: Arc::clone(&shared),
        },
        PipeReader { shared },
    )
}

/// Writing half of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Mutex<PipeShared>>,
}

impl PipeWriter {
    /// Bytes the pipe can take right now.
    #[must_use]
    pub fn space(&self) -> usize {
        let shared = self.shared.lock();
        match shared.capacity {
            Some(capacity) => capacity.saturating_sub(shared.buf.len()),
            None => usize::MAX,
        }
    }

    /// Check if a write would accept at least one byte.
    #[must_use]
    pub fn has_space(&self) -> bool {
        self.space() > 0
    }
}

impl Sink for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        if shared.reader_dropped {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe reader was dropped",
            ));
        }
        if shared.writer_closed {
            return Ok(0);
        }
        let space = match shared.capacity {
            Some(capacity) => capacity.saturating_sub(shared.buf.len()),
            None => buf.len(),
        };
        if space == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(space);
        shared.buf.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn is_peer_open(&self) -> bool {
        self.shared.lock().reader_open
    }

    fn release(&mut self) {
        self.shared.lock().writer_closed = true;
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.lock().writer_closed = true;
    }
}

/// Reading half of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Mutex<PipeShared>>,
}

impl PipeReader {
    /// Mark the reading half as open.
    pub fn open(&self) {
        self.shared.lock().reader_open = true;
    }

    /// Bytes waiting to be read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().buf.len()
    }

    /// Check if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the writing half closed.
    #[must_use]
    pub fn is_writer_closed(&self) -> bool {
        self.shared.lock().writer_closed
    }

    /// Copy waiting bytes into `out`.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut shared = self.shared.lock();
        let n = out.len().min(shared.buf.len());
        out[..n].copy_from_slice(&shared.buf[..n]);
        let _ = shared.buf.split_to(n);
        n
    }

    /// Take everything waiting.
    pub fn take(&self) -> Bytes {
        self.shared.lock().buf.split().freeze()
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        shared.reader_open = false;
        shared.reader_dropped = true;
    }
}
