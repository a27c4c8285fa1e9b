//! Body sources and the ordered list they are appended to.
//!
//! A [`Source`] describes one unit of input. Nothing is opened when a source
//! is appended: [`Source::open_reader`] turns a descriptor into a readable
//! [`ByteStream`] only when the aggregate cursor reaches it, so at most one
//! file or stream is open at a time.

use crate::error::{BodyError, BodyResult};
use bytes::Bytes;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// A readable byte stream produced from a source.
pub type ByteStream = Box<dyn Read + Send>;

/// Total length of a body, if every source declared one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredLength {
    /// Sum of all declared source lengths.
    Known(u64),
    /// At least one source has no declared length.
    Unknown,
}

impl Default for DeclaredLength {
    fn default() -> Self {
        Self::Known(0)
    }
}

impl DeclaredLength {
    /// Add a source length. Once unknown, stays unknown.
    #[must_use]
    pub fn add(self, len: Option<u64>) -> Self {
        match (self, len) {
            (Self::Known(total), Some(len)) => Self::Known(total.saturating_add(len)),
            _ => Self::Unknown,
        }
    }

    /// Get the length if known.
    #[must_use]
    pub fn known(&self) -> Option<u64> {
        match self {
            Self::Known(len) => Some(*len),
            Self::Unknown => None,
        }
    }

    /// Check if the length is unknown.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for DeclaredLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(len) => write!(f, "{len}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// One unit of body content.
pub enum Source {
    /// In-memory bytes.
    Bytes(Bytes),
    /// File contents, read from the path when the source is reached.
    File {
        /// File path.
        path: PathBuf,
        /// Size reported by the filesystem when the file was added.
        len: u64,
    },
    /// An already opened byte stream.
    Stream {
        /// The stream, until it is handed out.
        stream: Option<ByteStream>,
        /// Declared length, if the caller gave one.
        len: Option<u64>,
    },
}

impl Source {
    /// Declared length of this source.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::File { len, .. } => Some(*len),
            Self::Stream { len, .. } => *len,
        }
    }

    /// Short name of the source kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::File { .. } => "file",
            Self::Stream { .. } => "stream",
        }
    }

    /// Open this source for reading.
    ///
    /// Blobs and files can be opened any number of times. A stream is handed
    /// out once; reopening it yields an empty reader.
    pub fn open_reader(&mut self) -> io::Result<ByteStream> {
        match self {
            Self::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Self::File { path, .. } => {
                let file = File::open(path.as_path())?;
                Ok(Box::new(file))
            }
            Self::Stream { stream, .. } => match stream.take() {
                Some(stream) => Ok(stream),
                None => {
                    warn!("Stream source was already consumed, treating it as empty");
                    Ok(Box::new(io::empty()))
                }
            },
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::File { path, len } => f
                .debug_struct("File")
                .field("path", path)
                .field("len", len)
                .finish(),
            Self::Stream { stream, len } => f
                .debug_struct("Stream")
                .field("available", &stream.is_some())
                .field("len", len)
                .finish(),
        }
    }
}

/// Ordered list of sources with their running declared length.
#[derive(Debug, Default)]
pub struct SourceList {
    sources: Vec<Source>,
    declared: DeclaredLength,
}

impl SourceList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append in-memory bytes. Empty blobs are skipped.
    pub fn push_bytes(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        if data.is_empty() {
            return;
        }
        self.push(Source::Bytes(data));
    }

    /// Append a file, sized from its metadata.
    pub fn push_file(&mut self, path: impl AsRef<Path>) -> BodyResult<()> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|source| BodyError::FileSize {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(BodyError::NotAFile(path.to_path_buf()));
        }
        self.push(Source::File {
            path: path.to_path_buf(),
            len: metadata.len(),
        });
        Ok(())
    }

    /// Append a file addressed by a `file://` URL.
    pub fn push_file_url(&mut self, url: &Url) -> BodyResult<()> {
        if url.scheme() != "file" {
            return Err(BodyError::NotAFileUrl(url.to_string()));
        }
        let path = url
            .to_file_path()
            .map_err(|()| BodyError::NotAFileUrl(url.to_string()))?;
        self.push_file(path)
    }

    /// Append a stream. Without a length the declared length becomes unknown.
    pub fn push_stream(&mut self, stream: ByteStream, len: Option<u64>) {
        self.push(Source::Stream {
            stream: Some(stream),
            len,
        });
    }

    fn push(&mut self, source: Source) {
        self.declared = self.declared.add(source.len());
        debug!(
            kind = source.kind(),
            index = self.sources.len(),
            declared = %self.declared,
            "Appended source"
        );
        self.sources.push(source);
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Declared total length.
    #[must_use]
    pub fn declared_length(&self) -> DeclaredLength {
        self.declared
    }

    /// Get a source by position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Source> {
        self.sources.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Source> {
        self.sources.get_mut(index)
    }

    /// Iterate over the sources in order.
    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }
}
