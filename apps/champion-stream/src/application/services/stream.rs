//! Stream Service
//!
//! Owns the lifecycle of one logical event stream: the connection state,
//! the handler registry shared by every consumer of that stream, connection
//! reuse across redundant `connect` calls, and reconnect scheduling.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──connect──► Connecting ──opened──► Open
//!    ▲                    │                   │
//!    │                    └──error/end──► Closed ◄──┘
//!    │                                      │
//!    └──────────────disconnect──────────────┘  (reconnect timer → Connecting)
//! ```
//!
//! # Concurrency
//!
//! All mutable state sits behind one mutex that is never held across an
//! `.await` or while a consumer callback runs. Each transport attempt runs
//! in its own task with a generation number and cancellation token; events
//! from superseded generations are discarded. At most one reconnect timer is
//! pending at a time.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::registry::{self, HandlerRegistry, MessageHandler};
use crate::application::ports::{
    BackendKind, StreamBackend, StreamEnd, TransportDefaults, TransportError, TransportEvents,
};
use crate::domain::stream::{ConnectionState, Endpoint, StreamMessage};
use crate::infrastructure::{metrics, telemetry};

// =============================================================================
// Callbacks and Requests
// =============================================================================

/// Callback invoked when the transport fails.
pub type ErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Callback invoked when the transport opens.
pub type OpenCallback = Arc<dyn Fn() + Send + Sync>;

/// Per-connection reconnect overrides. `None` uses the backend default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectOverrides {
    /// Reconnect after a transport error.
    pub auto_reconnect: Option<bool>,
    /// Reconnect after the server ends the stream.
    pub reconnect_on_end: Option<bool>,
    /// Delay before reconnecting.
    pub interval: Option<Duration>,
}

impl ReconnectOverrides {
    const fn resolve(self, defaults: TransportDefaults) -> TransportDefaults {
        TransportDefaults {
            auto_reconnect: match self.auto_reconnect {
                Some(v) => v,
                None => defaults.auto_reconnect,
            },
            reconnect_on_end: match self.reconnect_on_end {
                Some(v) => v,
                None => defaults.reconnect_on_end,
            },
        }
    }
}

/// Arguments to `StreamService::connect`.
#[derive(Clone)]
pub struct ConnectRequest {
    /// Stream to open.
    pub endpoint: Endpoint,
    /// Handler to register.
    pub on_message: Option<MessageHandler>,
    /// Invoked on transport failure.
    pub on_error: Option<ErrorCallback>,
    /// Invoked when the transport opens.
    pub on_open: Option<OpenCallback>,
    /// Reconnect overrides.
    pub reconnect: ReconnectOverrides,
}

impl ConnectRequest {
    /// Create a request for `endpoint` with no callbacks.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            on_message: None,
            on_error: None,
            on_open: None,
            reconnect: ReconnectOverrides::default(),
        }
    }

    /// Set the message handler.
    #[must_use]
    pub fn on_message(mut self, handler: MessageHandler) -> Self {
        self.on_message = Some(handler);
        self
    }

    /// Set the error callback.
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Set the open callback.
    #[must_use]
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Override reconnect-after-error.
    #[must_use]
    pub const fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect.auto_reconnect = Some(enabled);
        self
    }

    /// Override reconnect-after-end-of-stream.
    #[must_use]
    pub const fn reconnect_on_end(mut self, enabled: bool) -> Self {
        self.reconnect.reconnect_on_end = Some(enabled);
        self
    }

    /// Override the reconnect interval.
    #[must_use]
    pub const fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect.interval = Some(interval);
        self
    }
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug)]
struct Session {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct PendingReconnect {
    cancel: CancellationToken,
}

struct Inner {
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    on_error: Option<ErrorCallback>,
    on_open: Option<OpenCallback>,
    options: TransportDefaults,
    policy: ReconnectPolicy,
    registry: HandlerRegistry,
    session: Option<Session>,
    reconnect: Option<PendingReconnect>,
    generation: u64,
}

struct Shared {
    backend: Arc<dyn StreamBackend>,
    config: ReconnectConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state == state {
            return;
        }
        tracing::debug!(
            backend = %self.backend.kind(),
            from = %inner.state,
            to = %state,
            "Stream state changed"
        );
        inner.state = state;
        self.state_tx.send_replace(state);
        metrics::set_connected(state.is_open());
    }

    /// Cancel transport and timer, forget the endpoint, clear handlers.
    fn close_locked(&self, inner: &mut Inner) {
        if let Some(pending) = inner.reconnect.take() {
            pending.cancel.cancel();
        }
        if let Some(session) = inner.session.take() {
            session.cancel.cancel();
        }
        inner.generation += 1;
        inner.registry.clear();
        inner.endpoint = None;
        inner.on_error = None;
        inner.on_open = None;
        self.set_state(inner, ConnectionState::Idle);
    }

    fn spawn_session(self: &Arc<Self>, inner: &mut Inner) {
        let Some(endpoint) = inner.endpoint.clone() else {
            return;
        };

        if let Some(previous) = inner.session.take() {
            previous.cancel.cancel();
        }

        inner.generation += 1;
        let generation = inner.generation;
        let cancel = CancellationToken::new();
        inner.session = Some(Session {
            generation,
            cancel: cancel.clone(),
        });
        self.set_state(inner, ConnectionState::Connecting);

        tracing::info!(
            backend = %self.backend.kind(),
            url = %endpoint.url,
            generation,
            "Opening event stream"
        );

        let span = telemetry::stream_session(self.backend.kind(), generation, &endpoint);
        let shared = Arc::clone(self);
        tokio::spawn(
            async move {
                let events = SessionEvents {
                    shared: Arc::clone(&shared),
                    generation,
                    cancel: cancel.clone(),
                };
                let result = shared.backend.run(&endpoint, &events, &cancel).await;
                shared.finish_session(generation, result);
            }
            .instrument(span),
        );
    }

    fn mark_open(&self, generation: u64) {
        let on_open = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            if let Some(pending) = inner.reconnect.take() {
                pending.cancel.cancel();
            }
            inner.policy.reset();
            self.set_state(&mut inner, ConnectionState::Open);
            inner.on_open.clone()
        };

        tracing::info!(backend = %self.backend.kind(), generation, "Event stream open");

        if let Some(on_open) = on_open {
            on_open();
        }
    }

    fn deliver(&self, generation: u64, cancel: &CancellationToken, message: &StreamMessage) {
        let handlers = {
            let inner = self.inner.lock();
            if inner.generation != generation || cancel.is_cancelled() {
                return;
            }
            inner.registry.snapshot()
        };

        registry::dispatch(&handlers, message, cancel);
    }

    fn finish_session(self: &Arc<Self>, generation: u64, result: Result<StreamEnd, TransportError>) {
        match result {
            Ok(StreamEnd::Cancelled) => {
                tracing::debug!(generation, "Event stream cancelled");
            }
            Ok(StreamEnd::Completed) => self.handle_stream_end(generation),
            Err(error) => self.handle_transport_error(generation, &error),
        }
    }

    fn handle_stream_end(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.session = None;
        self.set_state(&mut inner, ConnectionState::Closed);

        tracing::info!(backend = %self.backend.kind(), "Event stream complete");

        if inner.options.reconnect_on_end {
            self.schedule_reconnect(&mut inner);
        }
    }

    fn handle_transport_error(self: &Arc<Self>, generation: u64, error: &TransportError) {
        let on_error = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.session = None;
            self.set_state(&mut inner, ConnectionState::Closed);

            tracing::warn!(
                backend = %self.backend.kind(),
                error = %error,
                "Event stream connection error"
            );
            metrics::record_transport_error(self.backend.kind().as_str());

            if inner.options.auto_reconnect {
                self.schedule_reconnect(&mut inner);
            }
            inner.on_error.clone()
        };

        if let Some(on_error) = on_error {
            on_error(error);
        }
    }

    /// Replace any pending timer with a fresh one.
    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(previous) = inner.reconnect.take() {
            previous.cancel.cancel();
        }

        let Some(delay) = inner.policy.next_delay() else {
            tracing::error!(
                attempts = inner.policy.attempt_count(),
                "Maximum reconnection attempts exceeded"
            );
            return;
        };

        let attempt = inner.policy.attempt_count();
        let generation = inner.generation;
        let cancel = CancellationToken::new();
        inner.reconnect = Some(PendingReconnect {
            cancel: cancel.clone(),
        });

        tracing::info!(
            attempt,
            delay_ms = delay.as_millis(),
            "Scheduling event stream reconnect"
        );

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => shared.fire_reconnect(generation, &cancel),
            }
        });
    }

    fn fire_reconnect(self: &Arc<Self>, generation: u64, cancel: &CancellationToken) {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() || inner.generation != generation {
            return;
        }
        inner.reconnect = None;
        metrics::record_reconnect();
        self.spawn_session(&mut inner);
    }
}

/// Event sink handed to a backend run.
struct SessionEvents {
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
}

impl TransportEvents for SessionEvents {
    fn opened(&self) {
        if !self.cancel.is_cancelled() {
            self.shared.mark_open(self.generation);
        }
    }

    fn message(&self, message: StreamMessage) {
        self.shared.deliver(self.generation, &self.cancel, &message);
    }
}

// =============================================================================
// Stream Service
// =============================================================================

/// Shared event stream with connection reuse and reconnect policy.
///
/// Cheap to clone; clones share one connection. Construct one per logical
/// stream in the composition root and hand clones to consumers.
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct StreamService {
    shared: Arc<Shared>,
}

impl StreamService {
    /// Create a service over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StreamBackend>, config: ReconnectConfig) -> Self {
        let defaults = backend.defaults();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let inner = Inner {
            state: ConnectionState::Idle,
            endpoint: None,
            on_error: None,
            on_open: None,
            options: defaults,
            policy: ReconnectPolicy::new(config.clone()),
            registry: HandlerRegistry::new(),
            session: None,
            reconnect: None,
            generation: 0,
        };

        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                inner: Mutex::new(inner),
                state_tx,
            }),
        }
    }

    /// Connect to an endpoint and register the request's handler.
    ///
    /// Returns the number of registered handlers. Redundant calls are safe:
    /// an identical endpoint that is already open, or any connection in
    /// progress, only gains the handler. Anything else replaces the current
    /// connection and its handlers.
    pub fn connect(&self, request: ConnectRequest) -> usize {
        let ConnectRequest {
            endpoint,
            on_message,
            on_error,
            on_open,
            reconnect,
        } = request;

        let mut inner = self.shared.inner.lock();

        let reusable = inner.state == ConnectionState::Open
            && inner
                .endpoint
                .as_ref()
                .is_some_and(|current| current.same_stream(&endpoint));

        if reusable || inner.state == ConnectionState::Connecting {
            if let Some(handler) = on_message {
                inner.registry.add(handler);
            }
            tracing::debug!(
                url = %endpoint.url,
                handlers = inner.registry.len(),
                "Sharing existing event stream"
            );
            return inner.registry.len();
        }

        self.shared.close_locked(&mut inner);

        let config = reconnect
            .interval
            .map_or_else(|| self.shared.config.clone(), |i| self.shared.config.with_interval(i));
        inner.policy = ReconnectPolicy::new(config);
        inner.options = reconnect.resolve(self.shared.backend.defaults());
        inner.endpoint = Some(endpoint);
        inner.on_error = on_error;
        inner.on_open = on_open;
        if let Some(handler) = on_message {
            inner.registry.add(handler);
        }
        let count = inner.registry.len();

        self.shared.spawn_session(&mut inner);
        count
    }

    /// Close the connection and forget all handlers.
    ///
    /// Cancels any pending reconnect and the in-flight read. Safe to call
    /// when already disconnected.
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == ConnectionState::Idle && inner.session.is_none() && inner.reconnect.is_none()
        {
            inner.registry.clear();
            return;
        }
        tracing::info!(backend = %self.shared.backend.kind(), "Disconnecting event stream");
        self.shared.close_locked(&mut inner);
    }

    /// Whether the transport is open. Independent of handler count.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Register a handler without touching the transport.
    pub fn add_message_handler(&self, handler: MessageHandler) -> usize {
        self.shared.inner.lock().registry.add(handler)
    }

    /// Remove a handler without touching the transport.
    pub fn remove_message_handler(&self, handler: &MessageHandler) {
        self.shared.inner.lock().registry.remove(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.shared.inner.lock().registry.len()
    }

    /// Whether a reconnect timer is pending.
    #[must_use]
    pub fn has_pending_reconnect(&self) -> bool {
        self.shared.inner.lock().reconnect.is_some()
    }

    /// Which transport this service drives.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.shared.backend.kind()
    }

    /// Endpoint of the current connection.
    #[must_use]
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.shared.inner.lock().endpoint.clone()
    }

    /// Register a channel-backed consumer.
    ///
    /// The returned handle receives every dispatched message. Dropping it
    /// removes its handler. The channel closes when the service clears its
    /// handlers (on `disconnect` or a connect to a different endpoint).
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |message: &StreamMessage| {
            let _ = tx.send(message.clone());
        });
        self.add_message_handler(Arc::clone(&handler));

        Subscription {
            rx,
            handler: Arc::downgrade(&handler),
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl std::fmt::Debug for StreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("StreamService")
            .field("backend", &self.shared.backend.kind())
            .field("state", &inner.state)
            .field("endpoint", &inner.endpoint)
            .field("handlers", &inner.registry.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Channel handle for one consumer of a `StreamService`.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StreamMessage>,
    handler: Weak<dyn Fn(&StreamMessage) + Send + Sync>,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Wait for the next message. Returns `None` once the service has
    /// dropped this consumer.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        self.rx.recv().await
    }

    /// Take a message if one is queued.
    pub fn try_recv(&mut self) -> Option<StreamMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let (Some(shared), Some(handler)) = (self.shared.upgrade(), self.handler.upgrade()) {
            shared.inner.lock().registry.remove(&handler);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that fails every attempt immediately.
    #[derive(Default)]
    struct FailingBackend {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl StreamBackend for FailingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::EventSource
        }

        fn defaults(&self) -> TransportDefaults {
            TransportDefaults {
                auto_reconnect: true,
                reconnect_on_end: true,
            }
        }

        async fn run(
            &self,
            _endpoint: &Endpoint,
            _events: &dyn TransportEvents,
            _cancel: &CancellationToken,
        ) -> Result<StreamEnd, TransportError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Connect("refused".to_string()))
        }
    }

    fn service(backend: &Arc<FailingBackend>) -> StreamService {
        let backend: Arc<dyn StreamBackend> = backend.clone();
        StreamService::new(backend, ReconnectConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_errors_leave_one_pending_reconnect() {
        let backend = Arc::new(FailingBackend::default());
        let service = service(&backend);

        service.connect(ConnectRequest::new(Endpoint::new("http://stream.test/sse")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.runs.load(Ordering::SeqCst), 1);
        assert!(service.has_pending_reconnect());

        // A second error report for the same attempt inside the interval.
        let generation = service.shared.inner.lock().generation;
        service
            .shared
            .handle_transport_error(generation, &TransportError::StreamEnded);
        assert!(service.has_pending_reconnect());

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(backend.runs.load(Ordering::SeqCst), 2);

        service.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let backend = Arc::new(FailingBackend::default());
        let service = service(&backend);

        service.connect(ConnectRequest::new(Endpoint::new("http://stream.test/sse")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(service.has_pending_reconnect());

        service.disconnect();
        assert!(!service.has_pending_reconnect());
        assert_eq!(service.state(), ConnectionState::Idle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_callback_receives_transport_error() {
        let backend = Arc::new(FailingBackend::default());
        let service = service(&backend);
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);

        service.connect(
            ConnectRequest::new(Endpoint::new("http://stream.test/sse"))
                .auto_reconnect(false)
                .on_error(move |e| sink.lock().push(e.clone())),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            *errors.lock(),
            vec![TransportError::Connect("refused".to_string())]
        );
        assert_eq!(service.state(), ConnectionState::Closed);
        assert!(!service.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_interval_is_honoured() {
        let backend = Arc::new(FailingBackend::default());
        let service = service(&backend);

        service.connect(
            ConnectRequest::new(Endpoint::new("http://stream.test/sse"))
                .reconnect_interval(Duration::from_millis(200)),
        );

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(backend.runs.load(Ordering::SeqCst), 2);

        service.disconnect();
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_noop() {
        let backend = Arc::new(FailingBackend::default());
        let service = service(&backend);
        service.disconnect();
        service.disconnect();
        assert_eq!(service.state(), ConnectionState::Idle);
        assert_eq!(backend.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn overrides_resolve_against_defaults() {
        let defaults = TransportDefaults {
            auto_reconnect: false,
            reconnect_on_end: false,
        };
        let resolved = ReconnectOverrides {
            auto_reconnect: Some(true),
            ..ReconnectOverrides::default()
        }
        .resolve(defaults);
        assert!(resolved.auto_reconnect);
        assert!(!resolved.reconnect_on_end);
    }
}
