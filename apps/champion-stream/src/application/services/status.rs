//! Stream Status Tracker
//!
//! Folds the message stream into a small status record for dashboards and
//! the health endpoint: whether traffic is flowing, the most recent payload,
//! when traffic was first seen, and the last processing error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::registry::MessageHandler;
use super::stream::StreamService;
use crate::domain::stream::StreamMessage;

/// Error recorded when a payload cannot be decoded.
pub const PROCESS_ERROR: &str = "Failed to process message";

/// Point-in-time view of stream activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Traffic has been observed since the last reset.
    pub connected: bool,
    /// Most recent non-heartbeat payload.
    pub last_message: Option<Value>,
    /// When traffic was first observed.
    pub connection_time: Option<DateTime<Utc>>,
    /// Last processing error, cleared by the next good payload.
    pub error: Option<String>,
}

/// Tracks stream activity from dispatched messages.
#[derive(Clone)]
pub struct StreamStatus {
    snapshot: Arc<Mutex<StatusSnapshot>>,
    handler: MessageHandler,
}

impl StreamStatus {
    /// Create a tracker with an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        let snapshot = Arc::new(Mutex::new(StatusSnapshot::default()));
        let sink = Arc::clone(&snapshot);
        let handler: MessageHandler =
            Arc::new(move |message: &StreamMessage| observe(&mut sink.lock(), message));

        Self { snapshot, handler }
    }

    /// Register this tracker on `service`. Returns the handler count.
    pub fn attach(&self, service: &StreamService) -> usize {
        service.add_message_handler(Arc::clone(&self.handler))
    }

    /// Remove this tracker from `service`.
    pub fn detach(&self, service: &StreamService) {
        service.remove_message_handler(&self.handler);
    }

    /// Handler that feeds this tracker.
    #[must_use]
    pub fn handler(&self) -> MessageHandler {
        Arc::clone(&self.handler)
    }

    /// Record one message.
    pub fn observe(&self, message: &StreamMessage) {
        observe(&mut self.snapshot.lock(), message);
    }

    /// Current status.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.lock().clone()
    }

    /// Forget connection state, keeping the last message.
    pub fn reset(&self) {
        let mut snapshot = self.snapshot.lock();
        snapshot.connected = false;
        snapshot.connection_time = None;
    }
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamStatus")
            .field("snapshot", &*self.snapshot.lock())
            .finish()
    }
}

fn observe(snapshot: &mut StatusSnapshot, message: &StreamMessage) {
    let value = match message {
        StreamMessage::Heartbeat => None,
        StreamMessage::Payload(payload) => match payload.json() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "Failed to process stream message");
                snapshot.error = Some(PROCESS_ERROR.to_string());
                return;
            }
        },
    };

    let is_heartbeat = value
        .as_ref()
        .is_none_or(|v| v.get("type").and_then(Value::as_str) == Some("heartbeat"));

    if !is_heartbeat {
        snapshot.last_message = value;
        snapshot.error = None;
    }

    if !snapshot.connected {
        snapshot.connected = true;
        snapshot.connection_time = Some(Utc::now());
    }
}
