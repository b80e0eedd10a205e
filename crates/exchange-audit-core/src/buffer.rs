//! Exchange-private response buffer

use crate::body::{exceeds_limit, limit_message, seek_target, Body};
use crate::error::BoxError;
use http_body_util::BodyExt;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, ReadBuf};

/// In-memory, seekable stand-in for the outbound transport.
///
/// Downstream output is written here instead of to the caller so it can be
/// read back for auditing. Writes land at the cursor, overwriting or
/// extending the content; reads start at the cursor. Once captured, the
/// whole buffer is copied onward with [`ResponseBuffer::forward_to`].
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl ResponseBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// The written bytes, independent of the cursor
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Discard everything written so far
    pub fn reset(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    /// Write every data frame of `body` at the cursor.
    ///
    /// Trailers are not representable in the buffer and are dropped. Returns
    /// the number of bytes written, or the body's error if the stream failed.
    pub async fn drain(&mut self, body: Body) -> Result<u64, BoxError> {
        self.drain_limited(body, None).await
    }

    /// Like [`ResponseBuffer::drain`], failing once the buffer would hold
    /// more than `limit` bytes.
    ///
    /// The body is not read past the chunk that crosses the limit.
    pub async fn drain_limited(
        &mut self,
        mut body: Body,
        limit: Option<usize>,
    ) -> Result<u64, BoxError> {
        let mut written = 0u64;
        while let Some(frame) = body.frame().await {
            if let Ok(chunk) = frame?.into_data() {
                if let Some(max) = exceeds_limit(limit, self.data.len(), chunk.len()) {
                    return Err(limit_message(max).into());
                }
                self.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
        }
        Ok(written)
    }

    /// Copy the full content, from the start, into `transport`.
    ///
    /// The cursor ends at the end of the buffer.
    pub async fn forward_to<W>(&mut self, transport: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.seek(SeekFrom::Start(0)).await?;
        let copied = tokio::io::copy(self, transport).await?;
        transport.flush().await?;
        Ok(copied)
    }

}

impl AsyncRead for ResponseBuffer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = this.pos.min(this.data.len());
        let remaining = &this.data[start..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        this.pos = start + n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ResponseBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let end = this.pos + buf.len();
        if end > this.data.len() {
            this.data.resize(end, 0);
        }
        this.data[this.pos..end].copy_from_slice(buf);
        this.pos = end;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for ResponseBuffer {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        // Seeking past the end is allowed; a later write zero-fills the gap.
        this.pos = seek_target(this.pos, this.data.len(), position)?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos as u64))
    }
}
