//! Per-request tracing span (§10.1).

use relay_core::ids::RequestId;
use tracing::Span;

/// Opens the `info_span!` every request runs inside, with `provider` and
/// `status` left empty until the router and the response hook fill them in
/// via [`record_provider`] / [`record_status`].
pub fn request_span(request_id: &RequestId) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id,
        provider = tracing::field::Empty,
        status = tracing::field::Empty,
    )
}

pub fn record_provider(span: &Span, provider: &str) {
    span.record("provider", provider);
}

pub fn record_status(span: &Span, status: u16) {
    span.record("status", status);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_records_fields_without_panicking() {
        let id = RequestId::new();
        let span = request_span(&id);
        let _guard = span.enter();
        record_provider(&span, "anthropic");
        record_status(&span, 200);
    }
}
