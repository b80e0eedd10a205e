//! Non-destructive body capture
//!
//! Both directions follow the same pattern: move the cursor to the start of a
//! seekable buffer, read everything into an audit copy, then put the cursor
//! back so the real consumer sees the bytes untouched.
//!
//! - Request side: the body is switched to a [`ReplayBody`] with
//!   [`Request::enable_buffering`] before anything reads it.
//! - Response side: downstream output has already been drained into a
//!   [`ResponseBuffer`]; the cursor is left at the start, ready for
//!   [`ResponseBuffer::forward_to`].
//!
//! Capture never fails the exchange. A read error turns into an empty string
//! on the request side and into a placeholder on the response side.
//!
//! [`ReplayBody`]: exchange_audit_core::ReplayBody

use exchange_audit_core::{Request, ResponseBuffer};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Appended to an audit copy that was cut short by `max_body_capture`.
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Decode bytes as UTF-8 for the audit copy.
///
/// Invalid sequences are replaced with U+FFFD. With a `limit`, text longer
/// than `limit` bytes is cut at the last character boundary at or below it
/// and [`TRUNCATION_MARKER`] is appended.
pub fn decode(bytes: &[u8], limit: Option<usize>) -> String {
    let text = String::from_utf8_lossy(bytes);
    match limit {
        Some(max) if text.len() > max => {
            let mut end = max;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            let mut cut = String::with_capacity(end + TRUNCATION_MARKER.len());
            cut.push_str(&text[..end]);
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
        _ => text.into_owned(),
    }
}

/// Capture the request body text and leave the body readable downstream.
///
/// Enables buffering (draining the transport stream once), reads the buffered
/// bytes from the start, then restores the cursor to where it was. A body
/// whose transport failed while buffering captures as `""`; downstream still
/// sees the partial bytes followed by the same error.
pub async fn capture_request(req: &mut Request, limit: Option<usize>) -> String {
    let replay = req.enable_buffering().await;

    if let Some(failure) = replay.failure() {
        tracing::debug!(error = %failure, "request body unreadable, capturing empty text");
        return String::new();
    }

    let origin = replay.position();
    let mut raw = Vec::with_capacity(replay.len());
    let read = async {
        replay.seek(SeekFrom::Start(0)).await?;
        replay.read_to_end(&mut raw).await
    }
    .await;

    if let Err(err) = replay.seek(SeekFrom::Start(origin)).await {
        tracing::warn!(error = %err, "failed to restore request body position");
    }

    match read {
        Ok(_) => decode(&raw, limit),
        Err(err) => {
            tracing::debug!(error = %err, "request body capture failed");
            String::new()
        }
    }
}

/// Capture the text downstream wrote into `buffer`.
///
/// Leaves the cursor at the start of the buffer. Returns `placeholder` if the
/// buffer could not be read.
pub async fn capture_response(
    buffer: &mut ResponseBuffer,
    limit: Option<usize>,
    placeholder: &str,
) -> String {
    let mut raw = Vec::with_capacity(buffer.len());
    let read = async {
        buffer.seek(SeekFrom::Start(0)).await?;
        buffer.read_to_end(&mut raw).await?;
        buffer.seek(SeekFrom::Start(0)).await
    }
    .await;

    match read {
        Ok(_) => decode(&raw, limit),
        Err(err) => {
            tracing::debug!(error = %err, "response body capture failed");
            placeholder.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use exchange_audit_core::{boxed, full, BoxError};
    use futures_util::stream;
    use http_body_util::{BodyExt, StreamBody};
    use hyper::body::Frame;
    use proptest::prelude::*;
    use tokio::io::AsyncWriteExt;

    fn post(body: &'static str) -> Request {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri("/items")
            .body(())
            .unwrap()
            .into_parts();
        Request::new(parts, full(body))
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        assert_eq!(decode(b"ok\xff", None), "ok\u{FFFD}");
    }

    #[test]
    fn test_decode_truncates_on_char_boundary() {
        // "é" is two bytes; a limit of 2 falls inside it.
        let text = decode("aé b".as_bytes(), Some(2));
        assert_eq!(text, format!("a{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_decode_under_limit_is_untouched() {
        assert_eq!(decode(b"short", Some(64)), "short");
    }

    #[tokio::test]
    async fn test_capture_request_leaves_body_for_downstream() {
        let mut req = post("{\"a\":1}");
        let text = capture_request(&mut req, None).await;
        assert_eq!(text, "{\"a\":1}");

        let downstream = req.bytes().await.unwrap();
        assert_eq!(&downstream[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_capture_request_restores_cursor_mid_read() {
        let mut req = post("abcdef");
        req.enable_buffering()
            .await
            .seek(SeekFrom::Start(2))
            .await
            .unwrap();

        let text = capture_request(&mut req, None).await;
        assert_eq!(text, "abcdef");
        assert_eq!(req.replay_body_mut().unwrap().position(), 2);
    }

    #[tokio::test]
    async fn test_capture_request_empty_body() {
        let mut req = post("");
        assert_eq!(capture_request(&mut req, None).await, "");
    }

    #[tokio::test]
    async fn test_capture_request_failed_stream_is_empty_text() {
        let frames = vec![
            Ok(hyper_frame("part")),
            Err(BoxError::from("connection reset")),
        ];
        let (parts, ()) = http::Request::builder()
            .method("PUT")
            .uri("/upload")
            .body(())
            .unwrap()
            .into_parts();
        let mut req = Request::new(parts, boxed(StreamBody::new(stream::iter(frames))));

        assert_eq!(capture_request(&mut req, None).await, "");

        let err = req.take_body().collect().await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    fn hyper_frame(data: &'static str) -> Frame<Bytes> {
        Frame::data(Bytes::from_static(data.as_bytes()))
    }

    #[tokio::test]
    async fn test_capture_response_rewinds_for_forwarding() {
        let mut buffer = ResponseBuffer::new();
        buffer.write_all(b"ok").await.unwrap();

        let text = capture_response(&mut buffer, None, "exception.").await;
        assert_eq!(text, "ok");
        assert_eq!(buffer.position(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_request_capture_is_non_destructive(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (captured, downstream) = rt.block_on(async {
                let (parts, ()) = http::Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(())
                    .unwrap()
                    .into_parts();
                let mut req = Request::new(parts, full(payload.clone()));
                let captured = capture_request(&mut req, None).await;
                let downstream = req.bytes().await.unwrap();
                (captured, downstream)
            });

            prop_assert_eq!(&downstream[..], &payload[..]);
            prop_assert_eq!(captured, String::from_utf8_lossy(&payload).into_owned());
        }
    }
}
