//! Balance stream adapter.
//!
//! Decodes payloads, normalizes either balance wire shape, and hands
//! `BalanceUpdate` records to consumers. Heartbeats and unrecognized payloads
//! never reach the consumer.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::WrappedHandlers;
use crate::application::services::{ConnectRequest, MessageHandler, StreamService};
use crate::domain::balance::{BalanceShape, BalanceUpdate};
use crate::domain::stream::{Endpoint, StreamMessage};

/// Consumer callback for normalized balance updates.
pub type BalanceHandler = Arc<dyn Fn(&BalanceUpdate) + Send + Sync>;

/// Wrap a closure as a `BalanceHandler`.
pub fn balance_handler<F>(f: F) -> BalanceHandler
where
    F: Fn(&BalanceUpdate) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Balance view over a `StreamService`.
pub struct BalanceStreamAdapter {
    service: StreamService,
    url: Mutex<Option<String>>,
    handlers: WrappedHandlers<dyn Fn(&BalanceUpdate) + Send + Sync>,
}

impl BalanceStreamAdapter {
    /// Create an adapter over `service`.
    #[must_use]
    pub fn new(service: StreamService) -> Self {
        Self {
            service,
            url: Mutex::new(None),
            handlers: WrappedHandlers::new(),
        }
    }

    /// Connect to the balance stream at `url` and register `handler`.
    ///
    /// Returns the number of handlers on the underlying stream. Connecting
    /// the same handler again does not register it twice.
    pub fn connect(&self, url: &str, handler: BalanceHandler) -> usize {
        *self.url.lock() = Some(url.to_string());

        let wrapped = self
            .handlers
            .wrapper_for(&handler, || wrap(Arc::clone(&handler)));

        self.service
            .connect(ConnectRequest::new(Endpoint::new(url)).on_message(wrapped))
    }

    /// Close the stream and forget every handler.
    pub fn disconnect(&self) {
        self.service.disconnect();
        self.handlers.clear();
    }

    /// Whether the underlying stream is open.
    #[must_use]
    pub fn connection_status(&self) -> bool {
        self.service.is_connected()
    }

    /// Remove a handler previously passed to `connect`.
    pub fn remove_message_handler(&self, handler: &BalanceHandler) {
        if let Some(wrapped) = self.handlers.take(handler) {
            self.service.remove_message_handler(&wrapped);
        }
    }

    /// Disconnect and forget the stream URL.
    pub fn handle_logout(&self) {
        self.disconnect();
        *self.url.lock() = None;
        tracing::info!("Balance stream reset after logout");
    }

    /// URL of the last `connect`, until logout.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }
}

impl std::fmt::Debug for BalanceStreamAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceStreamAdapter")
            .field("url", &*self.url.lock())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

fn wrap(handler: BalanceHandler) -> MessageHandler {
    Arc::new(move |message: &StreamMessage| {
        let StreamMessage::Payload(payload) = message else {
            return;
        };

        let value: Value = match payload.json() {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Balance stream: error processing message");
                return;
            }
        };

        if value.get("type").and_then(Value::as_str) == Some("heartbeat") {
            return;
        }

        let shape = BalanceShape::detect(&value);
        tracing::trace!(shape = shape.as_str(), "Balance payload received");

        match shape.normalize() {
            Some(update) => handler(&update),
            None => tracing::warn!(payload = %payload.as_str(), "Balance stream: invalid data format"),
        }
    })
}
