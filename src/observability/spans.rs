//! Structured spans for authenticated requests.

use std::time::Instant;

use tracing::{Level, Span, field, span};

/// One span per caller-facing request.
///
/// `status`, `latency_ms`, `dedup` and `retried` are recorded as the request
/// progresses; an entered span is not required, the fields are attached to
/// the span handle directly.
#[derive(Clone)]
pub struct RequestSpan {
    span: Span,
    start: Instant,
}

impl RequestSpan {
    pub fn new(method: &str, url: &str) -> Self {
        let span = span!(
            Level::DEBUG,
            "authfetch.request",
            method = method,
            url = url,
            status = field::Empty,
            latency_ms = field::Empty,
            dedup = field::Empty,
            retried = field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn record_status(&self, status: u16) {
        self.span.record("status", status);
    }

    pub fn mark_dedup(&self) {
        self.span.record("dedup", true);
    }

    pub fn mark_retried(&self) {
        self.span.record("retried", true);
    }

    pub fn finish(self) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.span.record("latency_ms", latency_ms);
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
