//! Vendor (Bedrock-family) binary Event-Stream framing (§6 "Event-Stream",
//! §4.7).
//!
//! Wire format per message: `total-length:u32 | headers-length:u32 |
//! prelude-crc:u32 | headers | payload | message-crc:u32`, all big-endian.
//! Headers are a sequence of `name-length:u8 | name | type:u8 | value`
//! entries; only the string (type 7) and boolean (types 0/1) value kinds
//! are interpreted here, which is all this proxy inspects
//! (`:event-type`, `:message-type`, `:exception-type`).

use bytes::Bytes;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventStreamError {
    #[error("event-stream message truncated")]
    Truncated,
    #[error("event-stream prelude CRC mismatch")]
    BadPreludeCrc,
    #[error("event-stream message CRC mismatch")]
    BadMessageCrc,
    #[error("event-stream header malformed")]
    BadHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventStreamMessage {
    pub event_type: Option<String>,
    pub message_type: Option<String>,
    pub exception_type: Option<String>,
    pub payload: Bytes,
}

const PRELUDE_LEN: usize = 8;
const CRC_LEN: usize = 4;

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

/// Attempt to parse one complete message from the front of `buf`. Returns
/// `Ok(None)` if `buf` doesn't yet contain a full message (caller should
/// buffer more bytes and retry); `Ok(Some((msg, consumed)))` on success.
pub fn parse_message(buf: &[u8]) -> Result<Option<(EventStreamMessage, usize)>, EventStreamError> {
    if buf.len() < PRELUDE_LEN + CRC_LEN {
        return Ok(None);
    }

    let total_len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    let headers_len = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
    let prelude_crc = u32::from_be_bytes(buf[8..12].try_into().unwrap());

    if total_len < PRELUDE_LEN + CRC_LEN + CRC_LEN {
        return Err(EventStreamError::Truncated);
    }
    if buf.len() < total_len {
        return Ok(None);
    }

    if crc32(&buf[0..8]) != prelude_crc {
        return Err(EventStreamError::BadPreludeCrc);
    }

    let message_crc_offset = total_len - CRC_LEN;
    let message_crc = u32::from_be_bytes(buf[message_crc_offset..total_len].try_into().unwrap());
    if crc32(&buf[0..message_crc_offset]) != message_crc {
        return Err(EventStreamError::BadMessageCrc);
    }

    let headers_start = PRELUDE_LEN + CRC_LEN;
    let headers_end = headers_start + headers_len;
    if headers_end > message_crc_offset {
        return Err(EventStreamError::BadHeader);
    }
    let headers = parse_headers(&buf[headers_start..headers_end])?;
    let payload = Bytes::copy_from_slice(&buf[headers_end..message_crc_offset]);

    let mut msg = EventStreamMessage {
        payload,
        ..Default::default()
    };
    for (name, value) in headers {
        match name.as_str() {
            ":event-type" => msg.event_type = Some(value),
            ":message-type" => msg.message_type = Some(value),
            ":exception-type" => msg.exception_type = Some(value),
            _ => {}
        }
    }

    Ok(Some((msg, total_len)))
}

fn parse_headers(mut buf: &[u8]) -> Result<Vec<(String, String)>, EventStreamError> {
    let mut headers = Vec::new();
    while !buf.is_empty() {
        let name_len = *buf.first().ok_or(EventStreamError::BadHeader)? as usize;
        buf = &buf[1..];
        if buf.len() < name_len + 1 {
            return Err(EventStreamError::BadHeader);
        }
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        buf = &buf[name_len..];
        let value_type = buf[0];
        buf = &buf[1..];

        let value = match value_type {
            0 | 1 => {
                // boolean-true / boolean-false: no value bytes.
                (value_type == 1).to_string()
            }
            7 => {
                if buf.len() < 2 {
                    return Err(EventStreamError::BadHeader);
                }
                let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
                buf = &buf[2..];
                if buf.len() < len {
                    return Err(EventStreamError::BadHeader);
                }
                let s = String::from_utf8_lossy(&buf[..len]).into_owned();
                buf = &buf[len..];
                s
            }
            // Any other header value type (int, timestamp, uuid, byte
            // array...) is skippable-by-length-prefix except fixed-width
            // numeric types, none of which this proxy reads.
            _ => return Err(EventStreamError::BadHeader),
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// Render a parsed message as an SSE event (§4.7 "FormatMessageAsSSE").
pub fn format_message_as_sse(msg: &EventStreamMessage) -> String {
    let event = crate::frame::SseEvent {
        event: msg.event_type.clone(),
        data: String::from_utf8_lossy(&msg.payload).into_owned(),
        ..Default::default()
    };
    event.format()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_message(event_type: &str, payload: &[u8]) -> Vec<u8> {
        let mut headers = Vec::new();
        let name = b":event-type";
        headers.push(name.len() as u8);
        headers.extend_from_slice(name);
        headers.push(7u8); // string
        headers.extend_from_slice(&(event_type.len() as u16).to_be_bytes());
        headers.extend_from_slice(event_type.as_bytes());

        let headers_len = headers.len() as u32;
        let total_len = (PRELUDE_LEN + CRC_LEN + headers.len() + payload.len() + CRC_LEN) as u32;

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

    #[test]
    fn parses_a_well_formed_message() {
        let encoded = encode_message("content_block_delta", b"{\"hello\":true}");
        let (msg, consumed) = parse_message(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(msg.event_type.as_deref(), Some("content_block_delta"));
        assert_eq!(&msg.payload[..], b"{\"hello\":true}");
    }

    #[test]
    fn returns_none_on_partial_buffer() {
        let encoded = encode_message("content_block_delta", b"payload");
        let partial = &encoded[..encoded.len() - 3];
        assert_eq!(parse_message(partial).unwrap(), None);
    }

    #[test]
    fn detects_bad_message_crc() {
        let mut encoded = encode_message("content_block_delta", b"payload");
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert_eq!(parse_message(&encoded), Err(EventStreamError::BadMessageCrc));
    }

    #[test]
    fn detects_bad_prelude_crc() {
        let mut encoded = encode_message("content_block_delta", b"payload");
        encoded[8] ^= 0xFF;
        assert_eq!(parse_message(&encoded), Err(EventStreamError::BadPreludeCrc));
    }

    #[test]
    fn parses_two_consecutive_messages() {
        let mut buf = encode_message("message_start", b"{}");
        buf.extend(encode_message("message_stop", b"{}"));

        let (first, consumed1) = parse_message(&buf).unwrap().unwrap();
        assert_eq!(first.event_type.as_deref(), Some("message_start"));
        let (second, consumed2) = parse_message(&buf[consumed1..]).unwrap().unwrap();
        assert_eq!(second.event_type.as_deref(), Some("message_stop"));
        assert_eq!(consumed1 + consumed2, buf.len());
    }

    #[test]
    fn format_as_sse_uses_event_type_and_payload() {
        let msg = EventStreamMessage {
            event_type: Some("ping".to_string()),
            payload: Bytes::from_static(b"{\"type\":\"ping\"}"),
            ..Default::default()
        };
        let sse = format_message_as_sse(&msg);
        assert_eq!(sse, "event: ping\ndata: {\"type\":\"ping\"}\n\n");
    }
}
