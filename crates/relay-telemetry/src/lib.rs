//! Structured logging and the debug/metrics sink (§4.9, §10.1).

mod init;
mod metrics;
mod redact;
mod span;

pub use init::{init, LogFormat};
pub use metrics::RequestTrace;
pub use redact::redact;
pub use span::{record_provider, record_status, request_span};
