//! Streaming response helpers: Event-Stream transcoding and in-flight
//! thinking-signature rewriting (§4.2 "Streaming signature processing",
//! §4.7), composed on top of the upstream byte stream before it reaches
//! the client.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use relay_sse::frame::parse_events;
use relay_thinking::SseSignatureProcessor;

struct Acc<S> {
    upstream: S,
    raw: Vec<u8>,
    queue: VecDeque<Bytes>,
    done: bool,
}

/// Wraps an upstream SSE byte stream, rewriting `content_block_delta`
/// events' thinking/signature fields through `processor` as they pass,
/// without buffering the response beyond one partially-received frame.
pub fn rewrite_thinking_stream<S, E>(
    upstream: S,
    mut processor: SseSignatureProcessor,
) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display,
{
    let acc = Acc {
        upstream,
        raw: Vec::new(),
        queue: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold((acc, processor), |(mut acc, mut processor)| async move {
        loop {
            if let Some(chunk) = acc.queue.pop_front() {
                return Some((Ok(chunk), (acc, processor)));
            }
            if acc.done {
                return None;
            }

            match acc.upstream.next().await {
                Some(Ok(bytes)) => {
                    acc.raw.extend_from_slice(&bytes);
                    let Ok(text) = std::str::from_utf8(&acc.raw) else {
                        continue;
                    };
                    let (events, consumed) = parse_events(text);
                    acc.raw.drain(..consumed);

                    for mut event in events {
                        if event.event.as_deref() == Some("content_block_delta") {
                            if let Ok(mut data) = serde_json::from_str::<Value>(&event.data) {
                                processor.process(&mut data).await;
                                event.data = data.to_string();
                            }
                        }
                        acc.queue.push_back(Bytes::from(event.format().into_bytes()));
                    }
                }
                Some(Err(e)) => {
                    return Some((
                        Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
                        (acc, processor),
                    ));
                }
                None => {
                    acc.done = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_thinking::MemorySignatureCache;
    use std::sync::Arc;
    use std::time::Duration;

    fn sse_chunk(event: &str, data: &Value) -> Bytes {
        Bytes::from(format!("event: {event}\ndata: {data}\n\n"))
    }

    #[tokio::test]
    async fn rewrites_signature_delta_to_prefixed_form() {
        let cache = Arc::new(MemorySignatureCache::new(Duration::from_secs(60)));
        let processor = SseSignatureProcessor::new("claude-sonnet-4", cache.clone());

        let chunks = vec![
            Ok::<_, std::io::Error>(sse_chunk(
                "content_block_delta",
                &serde_json::json!({"delta": {"type": "thinking_delta", "thinking": "hmm"}}),
            )),
            Ok(sse_chunk(
                "content_block_delta",
                &serde_json::json!({"delta": {"type": "signature_delta", "signature": "raw-sig"}}),
            )),
        ];
        let upstream = futures::stream::iter(chunks);
        let out_stream = rewrite_thinking_stream(upstream, processor);
        futures::pin_mut!(out_stream);

        let mut collected = Vec::new();
        while let Some(chunk) = out_stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        let text = String::from_utf8(collected).unwrap();
        assert!(text.contains("claude#raw-sig"));
    }

    #[tokio::test]
    async fn non_delta_events_pass_through_unchanged() {
        let cache = Arc::new(MemorySignatureCache::new(Duration::from_secs(60)));
        let processor = SseSignatureProcessor::new("claude-sonnet-4", cache);

        let chunks = vec![Ok::<_, std::io::Error>(sse_chunk(
            "message_stop",
            &serde_json::json!({}),
        ))];
        let upstream = futures::stream::iter(chunks);
        let out_stream = rewrite_thinking_stream(upstream, processor);
        futures::pin_mut!(out_stream);

        let mut collected = Vec::new();
        while let Some(chunk) = out_stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        let (events, _) = parse_events(&String::from_utf8(collected).unwrap());
        assert_eq!(events[0].event.as_deref(), Some("message_stop"));
    }
}
