//! Debug/metrics sink (§2, §10 "Debug/metrics sink"): an optional
//! per-request trace recorded as a single structured `tracing` event at
//! request completion, gated by `logging.debug` so it costs nothing when
//! off.

use std::time::{Duration, Instant};

use relay_core::ids::RequestId;

/// Accumulates the timings and counters of one request. Created when the
/// request starts; [`RequestTrace::finish`] emits the completion event.
pub struct RequestTrace {
    request_id: RequestId,
    started_at: Instant,
    upstream_connect_at: Option<Instant>,
    upstream_first_byte_at: Option<Instant>,
    request_bytes: u64,
    response_bytes: u64,
    sse_event_count: u64,
    enabled: bool,
}

impl RequestTrace {
    pub fn new(request_id: RequestId, enabled: bool) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            upstream_connect_at: None,
            upstream_first_byte_at: None,
            request_bytes: 0,
            response_bytes: 0,
            sse_event_count: 0,
            enabled,
        }
    }

    pub fn mark_upstream_connected(&mut self) {
        if self.enabled {
            self.upstream_connect_at = Some(Instant::now());
        }
    }

    pub fn mark_upstream_first_byte(&mut self) {
        if self.enabled && self.upstream_first_byte_at.is_none() {
            self.upstream_first_byte_at = Some(Instant::now());
        }
    }

    pub fn add_request_bytes(&mut self, n: u64) {
        self.request_bytes += n;
    }

    pub fn add_response_bytes(&mut self, n: u64) {
        self.response_bytes += n;
    }

    pub fn increment_sse_events(&mut self) {
        self.sse_event_count += 1;
    }

    fn elapsed_since_start(&self, at: Option<Instant>) -> Option<Duration> {
        at.map(|t| t.saturating_duration_since(self.started_at))
    }

    /// Emits the completion event, if tracing was enabled for this request.
    /// `provider` and `status` are passed in rather than read from the
    /// request context, since by completion time they're the only fields
    /// this module needs from it.
    pub fn finish(self, provider: Option<&str>, status: u16) {
        if !self.enabled {
            return;
        }
        let total = self.started_at.elapsed();
        let connect_ms = self.elapsed_since_start(self.upstream_connect_at).map(|d| d.as_millis());
        let first_byte_ms = self
            .elapsed_since_start(self.upstream_first_byte_at)
            .map(|d| d.as_millis());

        tracing::info!(
            target: "relay_telemetry::debug_metrics",
            request_id = %self.request_id,
            provider = provider.unwrap_or("unknown"),
            status,
            total_ms = total.as_millis() as u64,
            upstream_connect_ms = connect_ms.map(|v| v as u64),
            upstream_first_byte_ms = first_byte_ms.map(|v| v as u64),
            request_bytes = self.request_bytes,
            response_bytes = self.response_bytes,
            sse_event_count = self.sse_event_count,
            "request completed",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_trace_does_not_panic_on_finish() {
        let trace = RequestTrace::new(RequestId::new(), false);
        trace.finish(Some("anthropic"), 200);
    }

    #[test]
    fn enabled_trace_tracks_byte_and_event_counts() {
        let mut trace = RequestTrace::new(RequestId::new(), true);
        trace.add_request_bytes(100);
        trace.add_response_bytes(200);
        trace.increment_sse_events();
        trace.increment_sse_events();
        assert_eq!(trace.request_bytes, 100);
        assert_eq!(trace.response_bytes, 200);
        assert_eq!(trace.sse_event_count, 2);
    }

    #[test]
    fn marks_upstream_timings_once_enabled() {
        let mut trace = RequestTrace::new(RequestId::new(), true);
        trace.mark_upstream_connected();
        trace.mark_upstream_first_byte();
        assert!(trace.upstream_connect_at.is_some());
        assert!(trace.upstream_first_byte_at.is_some());
    }

    #[test]
    fn first_byte_marked_only_once() {
        let mut trace = RequestTrace::new(RequestId::new(), true);
        trace.mark_upstream_first_byte();
        let first = trace.upstream_first_byte_at;
        std::thread::sleep(Duration::from_millis(2));
        trace.mark_upstream_first_byte();
        assert_eq!(trace.upstream_first_byte_at, first);
    }

    #[test]
    fn disabled_trace_ignores_marks() {
        let mut trace = RequestTrace::new(RequestId::new(), false);
        trace.mark_upstream_connected();
        trace.mark_upstream_first_byte();
        assert!(trace.upstream_connect_at.is_none());
        assert!(trace.upstream_first_byte_at.is_none());
    }
}
