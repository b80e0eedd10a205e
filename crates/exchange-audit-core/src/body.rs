//! Body types
//!
//! [`Body`] is the boxed streaming body used on both sides of the pipeline.
//! [`ReplayBody`] is what a request body becomes once buffering is enabled:
//! the whole payload held in memory behind a read cursor that can be moved
//! back, so the same bytes can be read more than once.

use crate::error::BoxError;
use bytes::{Bytes, BytesMut};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Frame, SizeHint};
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// Boxed HTTP body shared by requests and responses
pub type Body = BoxBody<Bytes, BoxError>;

/// A body holding `bytes` in a single frame
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// A body with no content
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Box any compatible body
pub fn boxed<B>(body: B) -> Body
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}

/// The limit that `held + incoming` bytes would break, if any.
pub(crate) fn exceeds_limit(limit: Option<usize>, held: usize, incoming: usize) -> Option<usize> {
    limit.filter(|max| held.saturating_add(incoming) > *max)
}

/// Error text for a body that outgrew its buffering limit
pub(crate) fn limit_message(limit: usize) -> String {
    format!("body exceeds {} bytes", limit)
}

/// Resolve a [`SeekFrom`] against a cursor over `len` bytes.
pub(crate) fn seek_target(current: usize, len: usize, pos: SeekFrom) -> io::Result<usize> {
    let target = match pos {
        SeekFrom::Start(offset) => i128::from(offset),
        SeekFrom::End(delta) => len as i128 + i128::from(delta),
        SeekFrom::Current(delta) => current as i128 + i128::from(delta),
    };
    if target < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative position",
        ));
    }
    usize::try_from(target)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek position overflow"))
}

/// A fully buffered, re-readable request body.
///
/// Implements [`AsyncRead`] and [`AsyncSeek`] for cursor-style access and
/// [`hyper::body::Body`] so it can be handed downstream as a regular stream.
/// Reading through either interface advances the same cursor.
///
/// If the transport failed while the body was being buffered, the bytes that
/// did arrive are replayed and then the same failure is reported again, so a
/// reader sees what it would have seen on the raw stream.
#[derive(Debug, Clone, Default)]
pub struct ReplayBody {
    data: Bytes,
    pos: usize,
    failure: Option<String>,
}

impl ReplayBody {
    /// Wrap bytes that are already in memory
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            failure: None,
        }
    }

    /// An empty body
    pub fn empty() -> Self {
        Self::default()
    }

    /// Drain a streaming body into memory.
    ///
    /// Reads to end regardless of any declared length. A stream error stops
    /// the drain; the bytes read so far are kept and the error is remembered.
    pub async fn buffer(body: Body) -> Self {
        Self::buffer_limited(body, None).await
    }

    /// Like [`ReplayBody::buffer`], holding at most `limit` bytes.
    ///
    /// A body that would grow past `limit` stops at the chunk crossing it and
    /// is then treated like a failed stream.
    pub async fn buffer_limited(mut body: Body, limit: Option<usize>) -> Self {
        let mut data = BytesMut::new();
        let mut failure = None;

        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    let Ok(chunk) = frame.into_data() else {
                        continue;
                    };
                    if let Some(max) = exceeds_limit(limit, data.len(), chunk.len()) {
                        tracing::debug!(limit = max, "request body over buffering limit");
                        failure = Some(limit_message(max));
                        break;
                    }
                    data.extend_from_slice(&chunk);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "request body stream failed while buffering");
                    failure = Some(err.to_string());
                    break;
                }
            }
        }

        Self {
            data: data.freeze(),
            pos: 0,
            failure,
        }
    }

    /// Total buffered length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing was buffered
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Move the cursor back to the start
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// The transport error hit while buffering, if any
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// All buffered bytes, independent of the cursor
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Bytes from the cursor to the end, advancing the cursor.
    pub(crate) fn read_remaining(&mut self) -> Result<Bytes, BoxError> {
        let chunk = self.data.slice(self.pos.min(self.data.len())..);
        self.pos = self.data.len();
        match &self.failure {
            Some(msg) => Err(msg.clone().into()),
            None => Ok(chunk),
        }
    }
}

impl AsyncRead for ReplayBody {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = this.pos.min(this.data.len());
        let remaining = &this.data[start..];

        if remaining.is_empty() {
            if let Some(msg) = &this.failure {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, msg.clone())));
            }
            return Poll::Ready(Ok(()));
        }

        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        this.pos = start + n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for ReplayBody {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        // Past-the-end positions clamp: there is nothing to read there anyway.
        this.pos = seek_target(this.pos, this.data.len(), position)?.min(this.data.len());
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos as u64))
    }
}

impl hyper::body::Body for ReplayBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.pos < this.data.len() {
            let chunk = this.data.slice(this.pos..);
            this.pos = this.data.len();
            return Poll::Ready(Some(Ok(Frame::data(chunk))));
        }
        if let Some(msg) = this.failure.take() {
            return Poll::Ready(Some(Err(msg.into())));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.pos >= self.data.len() && self.failure.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        let remaining = self.data.len().saturating_sub(self.pos) as u64;
        if self.failure.is_some() {
            let mut hint = SizeHint::new();
            hint.set_lower(remaining);
            hint
        } else {
            SizeHint::with_exact(remaining)
        }
    }
}
