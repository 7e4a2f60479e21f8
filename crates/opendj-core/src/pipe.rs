//! Bounded in-process byte pipe joining the playback loop to the publisher.
//!
//! The writer is handed from one encoder run to the next, so the bytes of
//! consecutive entries land in the pipe strictly in order. Writes wait while
//! the pipe is full. Dropping the writer is end-of-stream for the reader,
//! dropping the reader makes further writes fail with `BrokenPipe`.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Default pipe capacity (1 MiB, roughly 50 seconds of 160 kbit/s audio).
pub const DEFAULT_PIPE_CAPACITY: usize = 1024 * 1024;

/// Byte counters shared by both ends of a pipe.
#[derive(Debug, Default)]
struct PipeStats {
    written: AtomicU64,
    read: AtomicU64,
}

/// Create a pipe buffering at most `capacity` bytes.
pub fn byte_pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (writer, reader) = tokio::io::duplex(capacity.max(1));
    let stats = Arc::new(PipeStats::default());

    (
        PipeWriter {
            inner: writer,
            stats: stats.clone(),
        },
        PipeReader {
            inner: reader,
            stats,
        },
    )
}

/// Writing half of a [`byte_pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    inner: DuplexStream,
    stats: Arc<PipeStats>,
}

impl PipeWriter {
    /// Total bytes accepted by the pipe so far.
    pub fn bytes_written(&self) -> u64 {
        self.stats.written.load(Ordering::Acquire)
    }

    /// Bytes written but not yet read.
    pub fn buffered(&self) -> u64 {
        self.bytes_written()
            .saturating_sub(self.stats.read.load(Ordering::Acquire))
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            self.stats.written.fetch_add(*n as u64, Ordering::AcqRel);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Reading half of a [`byte_pipe`].
#[derive(Debug)]
pub struct PipeReader {
    inner: DuplexStream,
    stats: Arc<PipeStats>,
}

impl PipeReader {
    /// Total bytes read from the pipe so far.
    pub fn bytes_read(&self) -> u64 {
        self.stats.read.load(Ordering::Acquire)
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let n = buf.filled().len() - before;
            self.stats.read.fetch_add(n as u64, Ordering::AcqRel);
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pipe_preserves_order_and_signals_eof() {
        let (mut writer, mut reader) = byte_pipe(64);

        let producer = tokio::spawn(async move {
            for chunk in [b"first ".as_slice(), b"second ".as_slice(), b"third".as_slice()] {
                writer.write_all(chunk).await.unwrap();
            }
            writer.bytes_written()
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"first second third");
        assert_eq!(producer.await.unwrap(), 18);
        assert_eq!(reader.bytes_read(), 18);
    }

    #[tokio::test]
    async fn test_pipe_backpressure_does_not_lose_data() {
        let (mut writer, mut reader) = byte_pipe(8);
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let expected = payload.clone();

        let producer = tokio::spawn(async move {
            writer.write_all(&payload).await.unwrap();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        producer.await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_write_after_reader_dropped_fails() {
        let (mut writer, reader) = byte_pipe(16);
        drop(reader);

        let err = writer.write_all(b"nobody listening").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_buffered_tracks_unread_bytes() {
        let (mut writer, mut reader) = byte_pipe(32);
        writer.write_all(b"0123456789").await.unwrap();
        assert_eq!(writer.buffered(), 10);

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(writer.buffered(), 6);
    }
}
