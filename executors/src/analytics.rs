use tokio::sync::mpsc;

/// Event names emitted over the transaction lifecycle.
pub mod events {
    pub const TRANSACTION_SUBMITTED: &str = "transaction_submitted";
    pub const TRANSACTION_FINALIZED: &str = "transaction_finalized";
    pub const TRANSACTION_CANCEL_SUBMITTED: &str = "transaction_cancel_submitted";
    pub const TRANSACTION_REPLACE_SUBMITTED: &str = "transaction_replace_submitted";
    pub const TRANSACTION_STALE: &str = "transaction_stale";
    pub const BATCH_SUBMITTED: &str = "batch_submitted";
}

/// Fire-and-forget analytics. Implementations must never block or fail the
/// calling flow; delivery problems are logged and dropped.
pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: &str, properties: serde_json::Value);
}

/// Sink that writes events to the structured log.
pub struct LogSink;

impl AnalyticsSink for LogSink {
    fn emit(&self, event: &str, properties: serde_json::Value) {
        tracing::info!(target: "txflow::analytics", event, %properties, "analytics event");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEvent {
    pub name: String,
    pub properties: serde_json::Value,
}

/// Sink that forwards events to an unbounded channel, for callers that
/// ship them to an external pipeline.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AnalyticsEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AnalyticsSink for ChannelSink {
    fn emit(&self, event: &str, properties: serde_json::Value) {
        let event = AnalyticsEvent {
            name: event.to_string(),
            properties,
        };
        if self.tx.send(event).is_err() {
            tracing::debug!(target: "txflow::analytics", "analytics receiver dropped, event discarded");
        }
    }
}
