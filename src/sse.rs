//! Server-Sent Events (SSE) processing for chat responses.
//!
//! The chat endpoint answers with a body of text lines. Lines beginning with
//! `data: ` carry one JSON-encoded [`ChatStreamEvent`]; every other line is
//! ignored. This module turns the raw byte chunks of one response body into a
//! lazy stream of those events.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::observability::{STREAM_BYTES, STREAM_DISCARDED_FRAMES, STREAM_ERRORS, STREAM_EVENTS};
use crate::{ChatStreamEvent, Error, Result};

/// Prefix that marks a line as carrying an event.
pub const FRAME_PREFIX: &str = "data: ";

/// Incremental line decoder for one response body.
///
/// Bytes are buffered until a newline arrives, so a frame (or a multi-byte
/// UTF-8 sequence) split across chunk boundaries decodes exactly as if it had
/// arrived whole. A decoder is good for one response only.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ChatStreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete
            .split(|b| *b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Drops whatever unterminated line remains at end of body and returns
    /// how many bytes it held. Only newline-terminated lines are frames.
    pub fn finish(&mut self) -> usize {
        std::mem::take(&mut self.buffer).len()
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Decode a single line, discarding anything that is not a well-formed frame.
fn decode_line(line: &[u8]) -> Option<ChatStreamEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let payload = line.strip_prefix(FRAME_PREFIX.as_bytes())?;
    let payload = String::from_utf8_lossy(payload);
    match serde_json::from_str::<ChatStreamEvent>(&payload) {
        Ok(event) => {
            STREAM_EVENTS.click();
            Some(event)
        }
        Err(_) => {
            STREAM_DISCARDED_FRAMES.click();
            None
        }
    }
}

struct SseState<S> {
    byte_stream: S,
    decoder: FrameDecoder,
    pending: VecDeque<ChatStreamEvent>,
    cancel: CancellationToken,
    finished: bool,
}

/// Process a stream of bytes into a stream of chat events.
///
/// Malformed frames are dropped silently. `Err` items only report failures of
/// the underlying body; the stream ends after yielding one. The stream also
/// ends as soon as `cancel` fires, even if buffered events remain.
///
/// ```
/// use bytes::Bytes;
/// use futures::StreamExt;
/// use tokio_util::sync::CancellationToken;
/// use weatherchat::ChatStreamEvent;
/// use weatherchat::sse::process_sse;
///
/// # tokio_test::block_on(async {
/// let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
///     Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"content\":\"Sun")),
///     Ok(Bytes::from_static(b"ny\"}\n\ndata: {\"type\":\"done\"}\n")),
/// ];
/// let events: Vec<_> = process_sse(futures::stream::iter(chunks), CancellationToken::new())
///     .map(|event| event.unwrap())
///     .collect()
///     .await;
/// assert_eq!(events, vec![ChatStreamEvent::token("Sunny"), ChatStreamEvent::Done]);
/// # })
/// ```
pub fn process_sse<S, E>(
    byte_stream: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<ChatStreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = SseState {
        byte_stream,
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        cancel,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.cancel.is_cancelled() {
                return None;
            }
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => return None,
                next = state.byte_stream.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    let events = state.decoder.push(&bytes);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    state.finished = true;
                    let err = Error::streaming(
                        format!("Error in HTTP stream: {e}"),
                        Some(Box::new(e)),
                    );
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    if state.decoder.finish() > 0 {
                        STREAM_DISCARDED_FRAMES.click();
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Citation;
    use std::io;

    type Chunks = stream::Iter<std::vec::IntoIter<std::result::Result<Bytes, io::Error>>>;

    fn chunks(parts: &[&[u8]]) -> Chunks {
        let items: Vec<_> = parts
            .iter()
            .map(|part| Ok(Bytes::copy_from_slice(part)))
            .collect();
        stream::iter(items)
    }

    async fn collect(parts: &[&[u8]]) -> Vec<ChatStreamEvent> {
        let sse = process_sse(chunks(parts), CancellationToken::new());
        sse.map(|event| event.unwrap()).collect().await
    }

    #[tokio::test]
    async fn parse_single_frame() {
        let events = collect(&[b"data: {\"type\":\"token\",\"content\":\"Hi\"}\n\n"]).await;
        assert_eq!(events, vec![ChatStreamEvent::token("Hi")]);
    }

    #[tokio::test]
    async fn parse_full_exchange() {
        let body = concat!(
            "data: {\"type\":\"token\",\"content\":\"Hel\"}\n\n",
            "data: {\"type\":\"token\",\"content\":\"lo\"}\n\n",
            "data: {\"type\":\"citations\",\"citations\":[{\"source\":\"NWS\",\"content\":\"...\",\"score\":0.9}]}\n\n",
            "data: {\"type\":\"done\"}\n\n",
        );
        let events = collect(&[body.as_bytes()]).await;
        assert_eq!(
            events,
            vec![
                ChatStreamEvent::token("Hel"),
                ChatStreamEvent::token("lo"),
                ChatStreamEvent::Citations {
                    citations: vec![Citation::new("NWS", "...", 0.9)],
                },
                ChatStreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn handle_split_frame() {
        let whole = collect(&[b"data: {\"type\":\"token\",\"content\":\"split\"}\n"]).await;
        let split = collect(&[
            b"da",
            b"ta: {\"type\":\"tok",
            b"en\",\"content\":\"spl",
            b"it\"}",
            b"\n",
        ])
        .await;
        assert_eq!(whole, split);
        assert_eq!(split, vec![ChatStreamEvent::token("split")]);
    }

    #[tokio::test]
    async fn handle_split_utf8_sequence() {
        let frame = "data: {\"type\":\"token\",\"content\":\"22°C ☀\"}\n";
        let bytes = frame.as_bytes();
        let degree = frame.find('°').unwrap();
        let events = collect(&[&bytes[..degree + 1], &bytes[degree + 1..]]).await;
        assert_eq!(events, vec![ChatStreamEvent::token("22°C ☀")]);
    }

    #[tokio::test]
    async fn malformed_frame_is_discarded() {
        let body = concat!(
            "data: {\"type\":\"token\",\"content\":\"A\"}\n",
            "data: {not json\n",
            "data: {\"type\":\"token\",\"content\":\"B\"}\n",
        );
        let events = collect(&[body.as_bytes()]).await;
        assert_eq!(
            events,
            vec![ChatStreamEvent::token("A"), ChatStreamEvent::token("B")]
        );
    }

    #[tokio::test]
    async fn non_data_lines_are_ignored() {
        let body = concat!(
            ": keep-alive\n",
            "event: message\n",
            "data:{\"type\":\"token\",\"content\":\"no space\"}\n",
            "data: {\"type\":\"done\"}\r\n",
        );
        let events = collect(&[body.as_bytes()]).await;
        assert_eq!(events, vec![ChatStreamEvent::Done]);
    }

    #[tokio::test]
    async fn unterminated_final_line_is_dropped() {
        let events = collect(&[
            b"data: {\"type\":\"token\",\"content\":\"A\"}\n",
            b"data: {\"type\":\"token\",\"content\":\"TAIL\"}",
        ])
        .await;
        assert_eq!(events, vec![ChatStreamEvent::token("A")]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let events = collect(&[b"data: {\"type\":\"token\",\"content\":\"22\xff C\"}\n"]).await;
        assert_eq!(events, vec![ChatStreamEvent::token("22\u{FFFD} C")]);
    }

    #[tokio::test]
    async fn done_does_not_end_the_stream() {
        let body = concat!(
            "data: {\"type\":\"done\"}\n",
            "data: {\"type\":\"token\",\"content\":\"late\"}\n",
        );
        let events = collect(&[body.as_bytes()]).await;
        assert_eq!(
            events,
            vec![ChatStreamEvent::Done, ChatStreamEvent::token("late")]
        );
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let items: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"content\":\"A\"}\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n")),
        ];
        let mut sse = Box::pin(process_sse(stream::iter(items), CancellationToken::new()));

        let first = sse.next().await.unwrap();
        assert_eq!(first.unwrap(), ChatStreamEvent::token("A"));

        let second = sse.next().await.unwrap();
        let err = second.unwrap_err();
        assert!(matches!(err, Error::Streaming { .. }));
        assert!(err.to_string().contains("reset"));

        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream() {
        let cancel = CancellationToken::new();
        let body = concat!(
            "data: {\"type\":\"token\",\"content\":\"A\"}\n",
            "data: {\"type\":\"token\",\"content\":\"B\"}\n",
        );
        let mut sse = Box::pin(process_sse(chunks(&[body.as_bytes()]), cancel.clone()));

        let first = sse.next().await.unwrap();
        assert_eq!(first.unwrap(), ChatStreamEvent::token("A"));

        cancel.cancel();
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_read() {
        let cancel = CancellationToken::new();
        let mut sse = Box::pin(process_sse(
            stream::pending::<std::result::Result<Bytes, io::Error>>(),
            cancel.clone(),
        ));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });
        assert!(sse.next().await.is_none());
    }

    #[test]
    fn decoder_retains_partial_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":").is_empty());
        assert_eq!(decoder.pending(), 14);
        assert_eq!(decoder.push(b"\"done\"}\n"), vec![ChatStreamEvent::Done]);
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.finish(), 0);
    }

    #[test]
    fn decoder_finish_drops_unterminated_line() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"done\"}\ndata: {\"type\":\"done\"}");
        assert_eq!(events, vec![ChatStreamEvent::Done]);
        assert_eq!(decoder.finish(), 21);
        assert_eq!(decoder.pending(), 0);
    }
}
