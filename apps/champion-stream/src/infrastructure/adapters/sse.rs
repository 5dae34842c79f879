//! Legacy SSE adapter.
//!
//! Presents the stream as `SseEvent { data }` values, the shape older
//! consumers were written against. Payloads are parsed and re-serialized
//! before delivery, so consumers always receive compact JSON. Connections
//! made through this adapter always reconnect after errors.

use std::sync::Arc;

use serde_json::Value;

use super::WrappedHandlers;
use crate::application::ports::TransportError;
use crate::application::services::{ConnectRequest, MessageHandler, StreamService};
use crate::domain::stream::{Endpoint, Headers, StreamMessage};

/// Event delivered to legacy consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Compact JSON text.
    pub data: String,
}

/// Consumer callback for legacy events.
pub type SseHandler = Arc<dyn Fn(&SseEvent) + Send + Sync>;

/// Wrap a closure as an `SseHandler`.
pub fn sse_handler<F>(f: F) -> SseHandler
where
    F: Fn(&SseEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Connection options for `SseServiceAdapter::connect`.
#[derive(Clone, Default)]
pub struct SseOptions {
    /// Stream URL.
    pub url: String,
    /// Request headers.
    pub headers: Headers,
    /// Send ambient credentials.
    pub with_credentials: bool,
    /// Event consumer.
    pub on_message: Option<SseHandler>,
    /// Transport error callback.
    pub on_error: Option<Arc<dyn Fn(&TransportError) + Send + Sync>>,
    /// Transport open callback.
    pub on_open: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl SseOptions {
    /// Options for `url` with no headers or callbacks.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.url.clone())
            .with_headers(self.headers.clone())
            .with_credentials(self.with_credentials)
    }
}

impl std::fmt::Debug for SseOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseOptions")
            .field("endpoint", &self.endpoint())
            .field("on_message", &self.on_message.is_some())
            .finish_non_exhaustive()
    }
}

/// Legacy event view over a `StreamService`.
pub struct SseServiceAdapter {
    service: StreamService,
    handlers: WrappedHandlers<dyn Fn(&SseEvent) + Send + Sync>,
}

impl SseServiceAdapter {
    /// Create an adapter over `service`.
    #[must_use]
    pub fn new(service: StreamService) -> Self {
        Self {
            service,
            handlers: WrappedHandlers::new(),
        }
    }

    /// Connect with reconnect-after-error forced on.
    ///
    /// Returns the number of handlers on the underlying stream.
    pub fn connect(&self, options: SseOptions) -> usize {
        let mut request = ConnectRequest::new(options.endpoint()).auto_reconnect(true);
        request.on_error = options.on_error;
        request.on_open = options.on_open;

        if let Some(handler) = options.on_message {
            let wrapped = self
                .handlers
                .wrapper_for(&handler, || wrap(Arc::clone(&handler)));
            request = request.on_message(wrapped);
        }

        self.service.connect(request)
    }

    /// Close the stream and forget every handler. Always returns 0.
    pub fn disconnect(&self) -> usize {
        self.service.disconnect();
        self.handlers.clear();
        0
    }

    /// Whether the underlying stream is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.service.is_connected()
    }

    /// Remove a handler previously passed to `connect`.
    pub fn remove_message_handler(&self, handler: &SseHandler) {
        if let Some(wrapped) = self.handlers.take(handler) {
            self.service.remove_message_handler(&wrapped);
        }
    }
}

impl std::fmt::Debug for SseServiceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseServiceAdapter")
            .field("service", &self.service)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

fn wrap(handler: SseHandler) -> MessageHandler {
    Arc::new(move |message: &StreamMessage| {
        match serde_json::from_str::<Value>(&message.data()) {
            Ok(value) => handler(&SseEvent {
                data: value.to_string(),
            }),
            Err(e) => tracing::error!(error = %e, "SSE adapter: error processing message"),
        }
    })
}
