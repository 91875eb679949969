//! Reader adaptor that presents an upstream vendor Event-Stream body as an
//! SSE byte stream (§4.7, §9 "streaming transcode without buffering the
//! full body").
//!
//! Two buffers: `raw` accumulates unparsed Event-Stream bytes from
//! upstream; `sse` is the queue of already-framed SSE bytes waiting to be
//! handed to the client. Order is preserved strictly — frames are appended
//! to `sse` in the order their Event-Stream messages are parsed, and no
//! `Read` ever reorders across calls (§5 "Ordering guarantees").

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::eventstream::{self, EventStreamError};

pub struct EventStreamTranscoder<S> {
    upstream: Pin<Box<S>>,
    raw: Vec<u8>,
    sse: VecDeque<Bytes>,
    upstream_done: bool,
}

impl<S, E> EventStreamTranscoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display,
{
    pub fn new(upstream: S) -> Self {
        Self {
            upstream: Box::pin(upstream),
            raw: Vec::new(),
            sse: VecDeque::new(),
            upstream_done: false,
        }
    }

    /// Parse every complete message currently buffered in `raw`, appending
    /// its SSE rendering to the `sse` queue and advancing past it.
    fn drain_raw(&mut self) -> Result<(), EventStreamError> {
        loop {
            match eventstream::parse_message(&self.raw)? {
                Some((msg, consumed)) => {
                    let sse_text = eventstream::format_message_as_sse(&msg);
                    self.sse.push_back(Bytes::from(sse_text.into_bytes()));
                    self.raw.drain(..consumed);
                }
                None => break,
            }
        }
        Ok(())
    }
}

impl<S, E> Stream for EventStreamTranscoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(chunk) = self.sse.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }

            if self.upstream_done {
                return Poll::Ready(None);
            }

            match self.upstream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.raw.extend_from_slice(&bytes);
                    if let Err(e) = self.drain_raw() {
                        return Poll::Ready(Some(Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            e.to_string(),
                        ))));
                    }
                    // Loop back around: either sse now has frames, or we
                    // need another chunk from upstream.
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        e.to_string(),
                    ))));
                }
                Poll::Ready(None) => {
                    self.upstream_done = true;
                    // Flush queue (already handled at loop top), then EOF.
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Drive the transcoder to completion, collecting every SSE chunk in
/// order. Test/utility helper; production use goes through `poll_next` via
/// `axum::body::Body::from_stream`.
pub async fn collect_all<S, E>(upstream: S) -> Result<Vec<u8>, std::io::Error>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display,
{
    let mut transcoder = EventStreamTranscoder::new(upstream);
    let mut out = Vec::new();
    while let Some(chunk) = transcoder.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    fn encode_message(event_type: &str, payload: &[u8]) -> Vec<u8> {
        // Mirrors eventstream::tests::encode_message; duplicated here to
        // keep the two test modules independent.
        fn crc32(bytes: &[u8]) -> u32 {
            const POLY: u32 = 0xEDB88320;
            let mut crc = 0xFFFF_FFFFu32;
            for &b in bytes {
                crc ^= b as u32;
                for _ in 0..8 {
                    let mask = (crc & 1).wrapping_neg();
                    crc = (crc >> 1) ^ (POLY & mask);
                }
            }
            !crc
        }

        let mut headers = Vec::new();
        let name = b":event-type";
        headers.push(name.len() as u8);
        headers.extend_from_slice(name);
        headers.push(7u8);
        headers.extend_from_slice(&(event_type.len() as u16).to_be_bytes());
        headers.extend_from_slice(event_type.as_bytes());

        let headers_len = headers.len() as u32;
        let total_len = (8 + 4 + headers.len() + payload.len() + 4) as u32;

        let mut prelude = Vec::new();
        prelude.extend_from_slice(&total_len.to_be_bytes());
        prelude.extend_from_slice(&headers_len.to_be_bytes());
        let prelude_crc = crc32(&prelude);

        let mut msg = prelude;
        msg.extend_from_slice(&prelude_crc.to_be_bytes());
        msg.extend_from_slice(&headers);
        msg.extend_from_slice(payload);
        let message_crc = crc32(&msg);
        msg.extend_from_slice(&message_crc.to_be_bytes());
        msg
    }

    #[tokio::test]
    async fn transcodes_n_messages_in_order() {
        let messages: Vec<Vec<u8>> = (0..5)
            .map(|i| encode_message("content_block_delta", format!("{{\"n\":{i}}}").as_bytes()))
            .collect();
        let mut all_bytes = Vec::new();
        for m in &messages {
            all_bytes.extend_from_slice(m);
        }

        // Feed upstream in two arbitrary-sized chunks to exercise partial
        // buffering across poll_next calls.
        let split = all_bytes.len() / 3;
        let chunk1 = Bytes::copy_from_slice(&all_bytes[..split]);
        let chunk2 = Bytes::copy_from_slice(&all_bytes[split..]);
        let upstream = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(chunk1),
            Ok(chunk2),
        ]);

        let out = collect_all(upstream).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let (events, _) = frame::parse_events(&text);

        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.event.as_deref(), Some("content_block_delta"));
            assert_eq!(event.data, format!("{{\"n\":{i}}}"));
        }
    }

    #[tokio::test]
    async fn partial_frame_buffered_across_reads() {
        let encoded = encode_message("message_stop", b"{}");
        let split = 5.min(encoded.len() - 1);
        let upstream = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(&encoded[..split])),
            Ok(Bytes::copy_from_slice(&encoded[split..])),
        ]);
        let out = collect_all(upstream).await.unwrap();
        let (events, _) = frame::parse_events(&String::from_utf8(out).unwrap());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message_stop"));
    }

    #[tokio::test]
    async fn empty_upstream_yields_no_events() {
        let upstream = futures::stream::iter(Vec::<Result<Bytes, std::io::Error>>::new());
        let out = collect_all(upstream).await.unwrap();
        assert!(out.is_empty());
    }
}
