//! Completed-request logging
//!
//! A [`RequestLogRecord`] is built exactly once per completed
//! (non-recording) request, inside the reply transition, and dispatched
//! to the context's two logger sinks. Aggregation of the records is an
//! external collaborator; the default sinks here emit structured tracing
//! events and metrics.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::debug;

use super::Endpoint;

/// Timing and routing metadata of one completed request.
#[derive(Debug, Clone)]
pub struct RequestLogRecord<'a> {
    /// Pool the final destination belonged to
    pub pool_name: &'a str,
    /// Destination that produced the reply
    pub endpoint: &'a Endpoint,
    /// Routing prefix stripped from the key during routing
    pub stripped_routing_prefix: &'a str,
    /// Operation name of the original request
    pub request_name: &'static str,
    /// Key length of the original request, in bytes
    pub key_len: usize,
    /// Result label of the reply
    pub reply_result: &'static str,
    /// When processing of the request began
    pub started_at: Instant,
    /// When the reply was sent
    pub finished_at: Instant,
}

impl RequestLogRecord<'_> {
    /// Wall time spent between request start and reply.
    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

/// Destination for completed-request records.
///
/// Every normal-mode context carries two sinks (primary stats logger and
/// an additional logger); both are invoked exactly once per reply.
pub trait RequestLogSink: Send + Sync {
    fn log(&self, record: &RequestLogRecord<'_>);
}

/// Sink emitting one structured `tracing` event per completed request.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl RequestLogSink for TracingLogSink {
    fn log(&self, record: &RequestLogRecord<'_>) {
        debug!(
            request = record.request_name,
            result = record.reply_result,
            pool = record.pool_name,
            endpoint = %record.endpoint,
            prefix = record.stripped_routing_prefix,
            key_len = record.key_len,
            elapsed_us = record.duration().as_micros() as u64,
            "request completed"
        );
    }
}

/// Sink recording request counters and latency histograms.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsLogSink;

impl RequestLogSink for MetricsLogSink {
    fn log(&self, record: &RequestLogRecord<'_>) {
        counter!(
            "cachegate_requests_completed",
            "request" => record.request_name,
            "result" => record.reply_result,
        )
        .increment(1);
        histogram!("cachegate_request_duration_us").record(record.duration().as_micros() as f64);
    }
}
