//! The aggregator: collects sources, then opens once in one of three modes.
//!
//! - Push: [`Aggregator::open_with_sink`] returns a [`BodyWriter`] that the
//!   caller's reactor drives with sink notifications.
//! - Pull: [`Aggregator::into_reader`] returns a [`BodyReader`] the consumer
//!   reads from.
//! - Collect: [`Aggregator::collect_all`] drives the writer to completion in
//!   memory and returns the bytes.
//!
//! Opening consumes the aggregator, so it can only happen once.

use crate::body::BodyReader;
use crate::buffer::PumpBuffer;
use crate::config::AggregatorConfig;
use crate::error::{BodyError, BodyResult};
use crate::event_loop::{run_until_closed, EventQueue};
use crate::reader::AggregateReader;
use crate::sink::{pipe, Sink, SinkEvent};
use crate::source::{DeclaredLength, SourceList};
use crate::writer::BodyWriter;
use bytes::Bytes;
use std::io::Read;
use std::path::Path;
use tokio::io::AsyncWrite;
use url::Url;

/// Ordered collection of body sources, not yet opened.
///
/// # Example
///
/// ```ignore
/// use concat_body::Aggregator;
///
/// let mut body = Aggregator::new()?;
/// body.add_bytes(r#"{"title":"scan"}"#);
/// body.add_file("scan.png")?;
///
/// let bytes = body.collect_all()?;
/// ```
#[derive(Debug)]
pub struct Aggregator {
    sources: SourceList,
    buffer: PumpBuffer,
    config: AggregatorConfig,
}

impl Aggregator {
    /// Create an aggregator with the default 32 KiB buffer.
    pub fn new() -> BodyResult<Self> {
        Self::with_config(AggregatorConfig::default())
    }

    /// Create an aggregator with a buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> BodyResult<Self> {
        Self::with_config(AggregatorConfig::new().buffer_capacity(capacity))
    }

    /// Create an aggregator from a config.
    ///
    /// Fails if the buffer cannot be allocated.
    pub fn with_config(config: AggregatorConfig) -> BodyResult<Self> {
        let buffer = PumpBuffer::with_capacity(config.buffer_capacity)?;
        Ok(Self {
            sources: SourceList::new(),
            buffer,
            config,
        })
    }

    /// Append in-memory bytes. Empty data is ignored.
    pub fn add_bytes(&mut self, data: impl Into<Bytes>) -> &mut Self {
        self.sources.push_bytes(data);
        self
    }

    /// Append a file. Its size is read now, its contents when reached.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> BodyResult<&mut Self> {
        self.sources.push_file(path)?;
        Ok(self)
    }

    /// Append a file addressed by a `file://` URL.
    pub fn add_file_url(&mut self, url: &Url) -> BodyResult<&mut Self> {
        self.sources.push_file_url(url)?;
        Ok(self)
    }

    /// Append a stream of unknown length.
    ///
    /// The declared length of the body becomes unknown.
    pub fn add_stream<R>(&mut self, stream: R) -> &mut Self
    where
        R: Read + Send + 'static,
    {
        self.sources.push_stream(Box::new(stream), None);
        self
    }

    /// Append a stream that will produce `len` bytes.
    pub fn add_stream_with_length<R>(&mut self, stream: R, len: u64) -> &mut Self
    where
        R: Read + Send + 'static,
    {
        self.sources.push_stream(Box::new(stream), Some(len));
        self
    }

    /// Declared total length.
    #[must_use]
    pub fn declared_length(&self) -> DeclaredLength {
        self.sources.declared_length()
    }

    /// Number of sources appended so far.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The config this aggregator was built with.
    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Open against a caller-supplied sink.
    ///
    /// The returned writer starts in `Opening` and does nothing until the
    /// sink's reactor delivers notifications to it.
    pub fn open_with_sink<S: Sink>(self, sink: S) -> BodyWriter<S> {
        BodyWriter::new(
            AggregateReader::new(self.sources),
            self.buffer,
            sink,
            self.config,
        )
    }

    /// Open for reading.
    #[must_use]
    pub fn into_reader(self) -> BodyReader {
        let (sink, output) = pipe(Some(self.config.buffer_capacity));
        let max_idle_polls = self.config.max_idle_polls;
        BodyReader::new(self.open_with_sink(sink), output, max_idle_polls)
    }

    /// Produce the whole body in memory.
    pub fn collect_all(self) -> BodyResult<Bytes> {
        let (sink, output) = pipe(None);
        output.open();
        let max_idle_polls = self.config.max_idle_polls;
        let mut writer = self.open_with_sink(sink);

        let mut queue = EventQueue::new();
        queue.post(SinkEvent::OpenCompleted);
        run_until_closed(&mut writer, &mut queue, max_idle_polls)?;

        match writer.take_error() {
            Some(error) => Err(error),
            None => Ok(output.take()),
        }
    }

    /// Write the whole body into an async writer, returning the byte count.
    pub async fn write_to<W>(self, dest: &mut W) -> BodyResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.into_reader().write_to(dest).await
    }
}

impl TryFrom<AggregatorConfig> for Aggregator {
    type Error = BodyError;

    fn try_from(config: AggregatorConfig) -> BodyResult<Self> {
        Self::with_config(config)
    }
}
