//! Reading across the source list as one stream.

use crate::error::BodyError;
use crate::source::{ByteStream, DeclaredLength, SourceList};
use std::io::ErrorKind;
use tracing::debug;

/// Result of one [`AggregateReader::read`] call.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Bytes were copied into the output.
    Read(usize),
    /// Every source has been read to the end.
    Exhausted,
    /// A source failed after `read` bytes were copied in this call.
    Failed {
        /// Bytes copied before the failure.
        read: usize,
        /// The failure.
        error: BodyError,
    },
}

impl ReadOutcome {
    /// Bytes copied into the output by this call.
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        match self {
            Self::Read(n) | Self::Failed { read: n, .. } => *n,
            Self::Exhausted => 0,
        }
    }
}

/// Reads the sources of a [`SourceList`] back to back.
///
/// Only the source under the cursor is open. When it reports end of stream
/// it is dropped and the next one is opened, so the end of one source is
/// never the end of the aggregate unless it was the last.
#[derive(Debug)]
pub struct AggregateReader {
    sources: SourceList,
    cursor: usize,
    active: Option<ActiveSource>,
}

struct ActiveSource {
    index: usize,
    stream: ByteStream,
}

impl std::fmt::Debug for ActiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSource")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl AggregateReader {
    /// Create a reader positioned before the first source.
    #[must_use]
    pub fn new(sources: SourceList) -> Self {
        Self {
            sources,
            cursor: 0,
            active: None,
        }
    }

    /// Declared length of the underlying sources.
    #[must_use]
    pub fn declared_length(&self) -> DeclaredLength {
        self.sources.declared_length()
    }

    /// The underlying sources.
    #[must_use]
    pub fn sources(&self) -> &SourceList {
        &self.sources
    }

    /// Index of the next source to open.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Index of the open source, if any.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.active.as_ref().map(|active| active.index)
    }

    /// Check if a source is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Close the open source and open the next one.
    ///
    /// Returns `Ok(false)` when there is no next source.
    pub fn advance(&mut self) -> Result<bool, BodyError> {
        self.active = None;

        let index = self.cursor;
        let Some(source) = self.sources.get_mut(index) else {
            debug!(sources = self.sources.len(), "All sources read");
            return Ok(false);
        };

        debug!(index, kind = source.kind(), "Opening source");
        let stream = source
            .open_reader()
            .map_err(|source| BodyError::SourceOpen { index, source })?;
        self.active = Some(ActiveSource { index, stream });
        self.cursor += 1;
        Ok(true)
    }

    /// Read into `out`, crossing source boundaries as needed.
    ///
    /// Opens the source under the cursor when none is open, so a source that
    /// failed to open is retried rather than skipped.
    pub fn read(&mut self, out: &mut [u8]) -> ReadOutcome {
        if self.active.is_none() && self.cursor < self.sources.len() {
            if let Err(error) = self.advance() {
                return ReadOutcome::Failed { read: 0, error };
            }
        }

        let mut total = 0;
        while total < out.len() {
            let Some(active) = self.active.as_mut() else {
                break;
            };

            match active.stream.read(&mut out[total..]) {
                Ok(0) => {
                    if let Err(error) = self.advance() {
                        return ReadOutcome::Failed { read: total, error };
                    }
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(source) => {
                    return ReadOutcome::Failed {
                        read: total,
                        error: BodyError::SourceRead {
                            index: active.index,
                            source,
                        },
                    };
                }
            }
        }

        if total == 0 && self.active.is_none() {
            ReadOutcome::Exhausted
        } else {
            ReadOutcome::Read(total)
        }
    }

    /// Drop the open source and rewind the cursor to the first source.
    pub fn reset(&mut self) {
        self.active = None;
        self.cursor = 0;
    }
}
