//! SSE wire-format parsing and emission (§6 "SSE wire format").
//!
//! Events are framed as `event:` / `id:` / `retry:` / one or more `data:`
//! lines, terminated by a blank line. `\r\n` and bare `\n` are both
//! tolerated; `:`-prefixed lines are comments; a single leading space after
//! the colon in a field value is stripped.

use axum::http::{HeaderMap, HeaderValue};

/// One parsed SSE event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<String>,
    /// Multiple `data:` lines are joined with `\n`, matching the spec's
    /// "one or more data: lines" framing.
    pub data: String,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Render back to SSE wire bytes, always `\n`-terminated and ending in
    /// a blank line.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(retry) = &self.retry {
            out.push_str("retry: ");
            out.push_str(retry);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Strip a single leading space from an SSE field value, per the spec.
fn strip_leading_space(s: &str) -> &str {
    s.strip_prefix(' ').unwrap_or(s)
}

/// Parse every complete (blank-line-terminated) event out of `buf`,
/// returning the parsed events and the number of bytes consumed. Bytes
/// after the last blank line (a partial event) are left unconsumed so the
/// caller can append more data and retry.
pub fn parse_events(buf: &str) -> (Vec<SseEvent>, usize) {
    let mut events = Vec::new();
    let mut consumed = 0;
    let mut rest = buf;

    loop {
        let Some((chunk, chunk_len)) = next_blank_line_terminated(rest) else {
            break;
        };
        consumed += chunk_len;
        rest = &rest[chunk_len..];

        if let Some(event) = parse_one(chunk) {
            events.push(event);
        }
    }

    (events, consumed)
}

/// Find the next chunk of `buf` up to and including a blank line
/// (`\n\n`, `\r\n\r\n`, or `\r\n\n`), returning it and its byte length.
fn next_blank_line_terminated(buf: &str) -> Option<(&str, usize)> {
    let bytes = buf.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            // Check whether the line that just ended was itself empty,
            // i.e. we're looking at a second consecutive newline.
            let line_start = buf[..i].rfind('\n').map(|p| p + 1).unwrap_or(0);
            let line = &buf[line_start..i];
            if line.is_empty() || line == "\r" {
                return Some((&buf[..i + 1], i + 1));
            }
        }
        i += 1;
    }
    None
}

fn parse_one(chunk: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines = Vec::new();
    let mut saw_any_field = false;

    for raw_line in chunk.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() {
            continue;
        }
        if line.starts_with(':') {
            continue; // comment
        }
        saw_any_field = true;
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, strip_leading_space(v)),
            None => (line, ""),
        };
        match field {
            "event" => event.event = Some(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            "retry" => event.retry = Some(value.to_string()),
            "data" => data_lines.push(value.to_string()),
            _ => {}
        }
    }

    if !saw_any_field {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

/// Headers an SSE response must carry (§4.6 response hook step a).
pub fn set_sse_response_headers(headers: &mut HeaderMap) {
    headers.insert("content-type", HeaderValue::from_static("text/event-stream"));
    headers.insert(
        "cache-control",
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert("connection", HeaderValue::from_static("keep-alive"));
}

/// Parse a `Content-Type` header value via the minimal media-type grammar
/// needed here: the type/subtype before any `;` parameters, case-folded.
pub fn media_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

pub fn is_event_stream(content_type: &str) -> bool {
    media_type(content_type).eq_ignore_ascii_case("text/event-stream")
}

/// Detect whether a client request asked for a streaming response, per the
/// Anthropic Messages API's `"stream": true` field.
pub fn request_wants_stream(body: &serde_json::Value) -> bool {
    body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_event() {
        let (events, consumed) = parse_events("event: message\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "hello");
        assert_eq!(consumed, "event: message\ndata: hello\n\n".len());
    }

    #[test]
    fn tolerates_crlf() {
        let (events, _) = parse_events("event: message\r\ndata: hello\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn multiple_data_lines_joined_with_newline() {
        let (events, _) = parse_events("data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn comment_lines_ignored() {
        let (events, _) = parse_events(": this is a comment\ndata: real\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "real");
    }

    #[test]
    fn leading_space_after_colon_stripped() {
        let (events, _) = parse_events("data: has one leading space stripped\n\n");
        assert_eq!(events[0].data, "has one leading space stripped");
    }

    #[test]
    fn no_leading_space_preserved_verbatim() {
        let (events, _) = parse_events("data:no space here\n\n");
        assert_eq!(events[0].data, "no space here");
    }

    #[test]
    fn partial_event_not_consumed() {
        let (events, consumed) = parse_events("event: message\ndata: incomplete");
        assert!(events.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn id_and_retry_fields_parsed() {
        let (events, _) = parse_events("id: 42\nretry: 5000\ndata: x\n\n");
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].retry.as_deref(), Some("5000"));
    }

    #[test]
    fn format_round_trips_a_simple_event() {
        let event = SseEvent::data("hello").with_event("message");
        let wire = event.format();
        let (parsed, _) = parse_events(&wire);
        assert_eq!(parsed[0], event);
    }

    #[test]
    fn two_consecutive_events_both_parsed_in_order() {
        let (events, _) = parse_events("data: first\n\ndata: second\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "first");
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(media_type("text/event-stream; charset=utf-8"), "text/event-stream");
        assert!(is_event_stream("text/event-stream;charset=utf-8"));
        assert!(!is_event_stream("application/json"));
    }

    #[test]
    fn sse_response_headers_set_correctly() {
        let mut headers = HeaderMap::new();
        set_sse_response_headers(&mut headers);
        assert_eq!(headers.get("content-type").unwrap(), "text/event-stream");
        assert_eq!(headers.get("connection").unwrap(), "keep-alive");
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
    }

    #[test]
    fn request_wants_stream_reads_stream_field() {
        assert!(request_wants_stream(&serde_json::json!({"stream": true})));
        assert!(!request_wants_stream(&serde_json::json!({"stream": false})));
        assert!(!request_wants_stream(&serde_json::json!({})));
    }
}
