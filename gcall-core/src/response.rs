//! # Response Collector
//!
//! Observes a (possibly multi-message) response stream and folds it into a
//! single [`CallResult`].
//!
//! The collector is a small state machine driven by three stream events:
//! *message received* marks success and stores the latest JSON rendering,
//! *error* marks failure (overriding any prior success), and *completed* is
//! terminal. Streams may deliver many messages before completing; each one
//! replaces the snapshot, so the result always reflects the last message the
//! transport delivered.
use tonic::Status;

/// Aggregated outcome of one call. Created fresh per call, mutated only by
/// the [`ResponseCollector`], read-only once the call completes.
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    success: bool,
    message_json: Option<String>,
    error: Option<Status>,
}

impl CallResult {
    pub fn success(&self) -> bool {
        self.success
    }

    /// JSON rendering of the final (or most recent) received message.
    pub fn message_json(&self) -> Option<&str> {
        self.message_json.as_deref()
    }

    /// The transport-reported failure cause, when the call did not succeed.
    pub fn error(&self) -> Option<&Status> {
        self.error.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct ResponseCollector {
    result: CallResult,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A message arrived: mark success and replace the latest snapshot.
    pub fn on_message(&mut self, message: &serde_json::Value) {
        let rendered =
            serde_json::to_string_pretty(message).unwrap_or_else(|_| message.to_string());
        tracing::info!(size_bytes = rendered.len(), "received response message");
        self.result.success = true;
        self.result.message_json = Some(rendered);
    }

    /// The stream failed: mark failure, keeping the cause. Overrides any
    /// success recorded for earlier messages.
    pub fn on_error(&mut self, status: Status) {
        tracing::error!(%status, "response stream error");
        self.result.success = false;
        self.result.error = Some(status);
    }

    /// The stream completed. Terminal; nothing further mutates the result.
    pub fn on_completed(&self) {
        let size_bytes = self.result.message_json.as_ref().map_or(0, String::len);
        tracing::info!(success = self.result.success, size_bytes, "response stream completed");
    }

    pub fn into_result(self) -> CallResult {
        self.result
    }
}
