//! Telemetry sink: records per-request metrics regardless of outcome
//! through a pluggable trait rather than a hardwired metrics backend, so a
//! deployment can wire in whatever monitoring it already runs.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::lanes::LaneResult;
use crate::query::QueryMode;

/// One emitted telemetry record per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTelemetry {
    pub trace_id: String,
    pub mode: QueryMode,
    pub total_elapsed_ms: u64,
    pub truncated: bool,
    pub model_used: Option<String>,
    pub cache_hit: bool,
    pub lanes: Vec<LaneResult>,
    pub refinement_applied: bool,
}

/// Sink every request's telemetry flows through. A no-op implementation is
/// the safe default; production wires in whatever aggregator the
/// deployment already runs (metrics pipeline, log shipper, etc.) without
/// the Orchestrator knowing the difference.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: RequestTelemetry);
}

/// Discards every event. Used in tests and anywhere telemetry is simply
/// not wanted.
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn record(&self, _event: RequestTelemetry) {}
}

/// Forwards events over a bounded channel so recording never blocks the
/// request path on a slow consumer; a full channel drops the oldest-style
/// backpressure is intentionally avoided here — telemetry is best-effort,
/// so a full channel just drops the event.
pub struct ChannelTelemetrySink {
    tx: mpsc::Sender<RequestTelemetry>,
}

impl ChannelTelemetrySink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RequestTelemetry>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelTelemetrySink {
    fn record(&self, event: RequestTelemetry) {
        if self.tx.try_send(event).is_err() {
            tracing::debug!("telemetry channel full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RequestTelemetry {
        RequestTelemetry {
            trace_id: "t1".to_string(),
            mode: QueryMode::Simple,
            total_elapsed_ms: 120,
            truncated: false,
            model_used: Some("m".to_string()),
            cache_hit: false,
            lanes: vec![],
            refinement_applied: false,
        }
    }

    #[test]
    fn null_sink_accepts_anything() {
        NullTelemetrySink.record(sample());
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelTelemetrySink::new(4);
        sink.record(sample());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.trace_id, "t1");
    }

    #[test]
    fn channel_sink_drops_when_full_rather_than_blocking() {
        let (sink, _rx) = ChannelTelemetrySink::new(1);
        sink.record(sample());
        sink.record(sample()); // second call must not panic or block
    }
}
