pub mod eventstream;
pub mod frame;
pub mod transcode;

pub use eventstream::{EventStreamError, EventStreamMessage};
pub use frame::{is_event_stream, media_type, request_wants_stream, set_sse_response_headers, SseEvent};
pub use transcode::EventStreamTranscoder;
