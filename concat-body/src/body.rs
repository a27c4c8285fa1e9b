//! Pull-mode access to an aggregated body.
//!
//! [`BodyReader`] runs a [`BodyWriter`] against the writing half of a bounded
//! [`pipe`](crate::sink::pipe) and hands the other half's bytes to whoever
//! reads from it, through [`std::io::Read`] or as a
//! [`futures::Stream`] of [`Bytes`] chunks (which is what
//! `reqwest::Body::wrap_stream` accepts).
//!
//! Sources are plain blocking readers, so polling the stream and
//! [`BodyReader::write_to`] perform their reads inline on the calling task.
//! [`BodyReader::write_to_spawned`] moves each refill onto tokio's blocking
//! pool instead.

use crate::error::{BodyError, BodyResult};
use crate::sink::{PipeReader, PipeWriter, Reaction, SinkEvent};
use crate::source::DeclaredLength;
use crate::state::WriterState;
use crate::writer::BodyWriter;
use bytes::Bytes;
use futures::Stream;
use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Readable handle over an aggregated body.
#[derive(Debug)]
pub struct BodyReader {
    writer: BodyWriter<PipeWriter>,
    pipe: PipeReader,
    started: bool,
    error_reported: bool,
    max_idle_polls: u32,
}

impl BodyReader {
    pub(crate) fn new(
        writer: BodyWriter<PipeWriter>,
        pipe: PipeReader,
        max_idle_polls: u32,
    ) -> Self {
        pipe.open();
        Self {
            writer,
            pipe,
            started: false,
            error_reported: false,
            max_idle_polls,
        }
    }

    /// Declared total length of the body.
    #[must_use]
    pub fn declared_length(&self) -> DeclaredLength {
        self.writer.declared_length()
    }

    /// Lifecycle state of the underlying writer.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.writer.state()
    }

    /// Check if the body is still being produced.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.writer.is_open()
    }

    /// First error recorded, if any.
    #[must_use]
    pub fn current_error(&self) -> Option<&BodyError> {
        self.writer.current_error()
    }

    /// Bytes produced so far, including any not read yet.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.writer.bytes_written()
    }

    /// Stop producing the body and drop anything not read yet.
    pub fn close(&mut self) {
        self.writer.close();
        let _ = self.pipe.take();
    }

    /// Pump until bytes are waiting in the pipe or the writer has closed.
    fn fill(&mut self) {
        let mut idle = 0u32;

        while self.pipe.is_empty() && self.writer.is_open() {
            let event = if self.started {
                SinkEvent::HasSpaceAvailable
            } else {
                self.started = true;
                SinkEvent::OpenCompleted
            };

            let before = self.writer.bytes_written();
            if let Reaction::RetryAfter(delay) = self.writer.handle_readiness(event) {
                debug!(?delay, "Writer deferred a write on an open pipe");
            }

            if self.writer.bytes_written() == before {
                idle += 1;
                if idle > self.max_idle_polls {
                    self.writer.abort(BodyError::Stalled(idle));
                }
            } else {
                idle = 0;
            }
        }
    }

    /// Pump and take whatever is waiting. Empty once the body is done.
    fn next_chunk(&mut self) -> Bytes {
        self.fill();
        self.pipe.take()
    }

    /// Write one chunk to `dest`, closing the body if `dest` rejects it.
    async fn forward<W>(&mut self, chunk: &[u8], dest: &mut W) -> BodyResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if let Err(e) = dest.write_all(chunk).await {
            self.close();
            return Err(BodyError::SinkWrite(e));
        }
        Ok(())
    }

    async fn finish<W>(&mut self, dest: &mut W, total: u64) -> BodyResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        dest.flush().await.map_err(BodyError::SinkWrite)?;
        match self.writer.take_error() {
            Some(error) => Err(error),
            None => Ok(total),
        }
    }

    /// Write the whole body into `dest`, returning the number of bytes.
    ///
    /// Source reads run inline, blocking the runtime worker that polls this
    /// future while a file or stream is read. Use
    /// [`write_to_spawned`](Self::write_to_spawned) when sources may be slow.
    ///
    /// Fails with the first error recorded while producing the body, or with
    /// [`BodyError::SinkWrite`] if `dest` rejects a write.
    pub async fn write_to<W>(mut self, dest: &mut W) -> BodyResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;
        loop {
            let chunk = self.next_chunk();
            if chunk.is_empty() {
                break;
            }
            self.forward(&chunk, dest).await?;
            total += chunk.len() as u64;
        }
        self.finish(dest, total).await
    }

    /// Like [`write_to`](Self::write_to), but every refill runs on tokio's
    /// blocking pool through [`tokio::task::spawn_blocking`].
    ///
    /// Fails with [`BodyError::Task`] if a refill task panics.
    pub async fn write_to_spawned<W>(mut self, dest: &mut W) -> BodyResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;
        loop {
            let (reader, chunk) = tokio::task::spawn_blocking(move || {
                let chunk = self.next_chunk();
                (self, chunk)
            })
            .await
            .map_err(|e| BodyError::Task(e.to_string()))?;
            self = reader;

            if chunk.is_empty() {
                break;
            }
            self.forward(&chunk, dest).await?;
            total += chunk.len() as u64;
        }
        self.finish(dest, total).await
    }
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill();
        let n = self.pipe.read(buf);
        if n > 0 {
            return Ok(n);
        }
        match self.writer.current_error() {
            Some(error) => Err(error.to_io_error()),
            None => Ok(0),
        }
    }
}

impl Stream for BodyReader {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let chunk = this.next_chunk();
        if !chunk.is_empty() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        if !this.error_reported {
            if let Some(error) = this.writer.current_error() {
                this.error_reported = true;
                return Poll::Ready(Some(Err(error.to_io_error())));
            }
        }
        Poll::Ready(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::AggregatorConfig;
    use crate::reader::tests::{Chunked, Failing};
    use crate::Aggregator;
    use bytes::Bytes;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::io::{self, Read};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncWrite;

    fn sample() -> Aggregator {
        let mut body = Aggregator::with_capacity(8).unwrap();
        body.add_bytes("{\"name\":\"report\"}")
            .add_stream(Chunked::new(b"--binary--".to_vec(), 3))
            .add_bytes(Bytes::from_static(b"tail"));
        body
    }

    #[test]
    fn test_read_to_end() {
        let mut reader = sample().into_reader();
        assert!(reader.declared_length().is_unknown());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"{\"name\":\"report\"}--binary--tail".to_vec());
        assert!(!reader.is_open());
        assert_eq!(reader.state(), crate::WriterState::Closed);
        assert_eq!(reader.bytes_written(), out.len() as u64);
        assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn test_chunks_never_exceed_capacity() {
        let mut reader = sample().into_reader();
        let mut buf = [0u8; 64];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            assert!(n <= 8);
        }
    }

    #[test]
    fn test_read_surfaces_source_error() {
        let mut body = Aggregator::with_capacity(16).unwrap();
        body.add_bytes("before")
            .add_stream(Failing::after(Vec::<u8>::new(), "device unplugged"));
        let mut reader = body.into_reader();

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(err.to_string().contains("device unplugged"));
        assert!(reader.current_error().unwrap().is_source_error());
    }

    #[tokio::test]
    async fn test_stream_chunks() {
        let chunks: Vec<io::Result<Bytes>> = sample().into_reader().collect().await;
        let joined: Vec<u8> = chunks
            .into_iter()
            .map(Result::unwrap)
            .flat_map(|chunk| chunk.to_vec())
            .collect();
        assert_eq!(joined, b"{\"name\":\"report\"}--binary--tail".to_vec());
    }

    #[tokio::test]
    async fn test_stream_reports_error_once() {
        let mut body = Aggregator::new().unwrap();
        body.add_stream(Failing::after(Vec::<u8>::new(), "boom"));
        let items: Vec<io::Result<Bytes>> = body.into_reader().collect().await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn test_write_to_vec() {
        let mut dest = Vec::new();
        let written = sample().into_reader().write_to(&mut dest).await.unwrap();
        assert_eq!(written, dest.len() as u64);
        assert_eq!(dest, b"{\"name\":\"report\"}--binary--tail".to_vec());
    }

    struct BrokenDest;

    impl AsyncWrite for BrokenDest {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_to_failing_dest() {
        let err = sample()
            .into_reader()
            .write_to(&mut BrokenDest)
            .await
            .unwrap_err();
        assert!(err.is_sink_error());
    }

    #[tokio::test]
    async fn test_write_to_reports_source_error() {
        let mut body = Aggregator::with_config(AggregatorConfig::new().buffer_capacity(4)).unwrap();
        body.add_bytes("partial").add_stream(Failing::after(Vec::<u8>::new(), "gone"));

        let mut dest = Vec::new();
        let err = body.into_reader().write_to(&mut dest).await.unwrap_err();
        assert!(err.is_source_error());
        assert!(b"partial".starts_with(&dest));
    }

    #[test]
    fn test_stream_is_always_ready() {
        let mut task = tokio_test::task::spawn(sample().into_reader());
        let first = tokio_test::assert_ready!(task.poll_next()).unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"{\"name\":"));

        while let Some(chunk) = tokio_test::assert_ready!(task.poll_next()) {
            assert!(chunk.unwrap().len() <= 8);
        }
        assert!(!task.is_woken());
    }

    #[tokio::test]
    async fn test_write_to_spawned() {
        let mut dest = Vec::new();
        let written = sample()
            .into_reader()
            .write_to_spawned(&mut dest)
            .await
            .unwrap();
        assert_eq!(written, 31);
        assert_eq!(dest, b"{\"name\":\"report\"}--binary--tail".to_vec());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_write_to_spawned_reports_source_error() {
        let mut body = Aggregator::with_capacity(4).unwrap();
        body.add_bytes("partial")
            .add_stream(Failing::after(Vec::<u8>::new(), "gone"));

        let mut dest = Vec::new();
        let err = body
            .into_reader()
            .write_to_spawned(&mut dest)
            .await
            .unwrap_err();
        assert!(err.is_source_error());
        assert!(err.to_string().contains("gone"));
        assert!(b"partial".starts_with(&dest));
    }

    #[test]
    fn test_reader_is_send() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<crate::BodyReader>();
    }

    #[test]
    fn test_close_drops_pending_bytes() {
        let mut reader = sample().into_reader();
        let mut first = [0u8; 1];
        assert_eq!(reader.read(&mut first).unwrap(), 1);

        reader.close();
        assert!(!reader.is_open());
        assert_eq!(reader.read(&mut [0u8; 16]).unwrap(), 0);
    }
}
