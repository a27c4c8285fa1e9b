//! Aggregation errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or streaming a body.
#[derive(Debug, Error)]
pub enum BodyError {
    /// A source could not be opened when the cursor reached it.
    #[error("Failed to open source {index}: {source}")]
    SourceOpen {
        /// Position of the source in the list.
        index: usize,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A source stream reported a read failure.
    #[error("Failed to read source {index}: {source}")]
    SourceRead {
        /// Position of the source in the list.
        index: usize,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The sink rejected a write.
    #[error("Sink write failed: {0}")]
    SinkWrite(#[source] io::Error),

    /// The sink accepted zero bytes.
    #[error("Sink closed before the body was fully written")]
    SinkClosed,

    /// The sink reported an error through its notifications.
    #[error("Sink error: {0}")]
    SinkFailed(String),

    /// File size could not be determined.
    #[error("Cannot determine size of {path}: {source}")]
    FileSize {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Path does not point at a regular file.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// Resource locator is not a `file://` URL.
    #[error("Not a file URL: {0}")]
    NotAFileUrl(String),

    /// Buffer could not be allocated.
    #[error("Failed to allocate a {0}-byte buffer")]
    Allocation(usize),

    /// Bytes written differ from the declared length.
    #[error("Wrote {written} bytes but {declared} were declared")]
    LengthMismatch {
        /// Declared total length.
        declared: u64,
        /// Bytes actually written.
        written: u64,
    },

    /// Synchronous driver made no progress.
    #[error("Body stalled after {0} idle polls")]
    Stalled(u32),

    /// A blocking refill task panicked or was cancelled.
    #[error("Blocking read task failed: {0}")]
    Task(String),
}

impl BodyError {
    /// Check if the error came from a source.
    #[must_use]
    pub fn is_source_error(&self) -> bool {
        matches!(self, Self::SourceOpen { .. } | Self::SourceRead { .. })
    }

    /// Check if the error came from the sink.
    #[must_use]
    pub fn is_sink_error(&self) -> bool {
        matches!(
            self,
            Self::SinkWrite(_) | Self::SinkClosed | Self::SinkFailed(_)
        )
    }

    /// Build an IO error describing this error, keeping the kind of a
    /// wrapped IO error where there is one.
    #[must_use]
    pub fn to_io_error(&self) -> io::Error {
        let kind = match self {
            Self::SourceOpen { source, .. }
            | Self::SourceRead { source, .. }
            | Self::FileSize { source, .. }
            | Self::SinkWrite(source) => source.kind(),
            Self::SinkClosed => io::ErrorKind::WriteZero,
            Self::NotAFile(_) | Self::NotAFileUrl(_) => io::ErrorKind::InvalidInput,
            Self::Allocation(_) => io::ErrorKind::OutOfMemory,
            Self::LengthMismatch { .. } => io::ErrorKind::InvalidData,
            Self::Stalled(_) => io::ErrorKind::TimedOut,
            Self::SinkFailed(_) | Self::Task(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, self.to_string())
    }
}

/// Result type for body operations.
pub type BodyResult<T> = Result<T, BodyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BodyError::LengthMismatch {
            declared: 5,
            written: 4,
        };
        assert_eq!(err.to_string(), "Wrote 4 bytes but 5 were declared");
    }

    #[test]
    fn test_error_classes() {
        let read = BodyError::SourceRead {
            index: 1,
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert!(read.is_source_error());
        assert!(!read.is_sink_error());
        assert!(BodyError::SinkClosed.is_sink_error());
        assert!(!BodyError::Stalled(3).is_source_error());
    }

    #[test]
    fn test_to_io_error_keeps_kind() {
        let err = BodyError::SinkWrite(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        let io_err = err.to_io_error();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
        assert!(io_err.to_string().contains("gone"));

        assert_eq!(
            BodyError::SinkClosed.to_io_error().kind(),
            io::ErrorKind::WriteZero
        );
    }
}
