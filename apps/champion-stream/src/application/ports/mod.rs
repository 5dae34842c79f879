//! Port Interfaces
//!
//! Defines the interfaces (ports) between the stream service and the
//! transports that feed it, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamBackend`: opens a stream and delivers decoded messages
//!
//! ## Callback Ports (Inbound from a backend run)
//!
//! - `TransportEvents`: receives open notifications and messages from a
//!   running backend

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::stream::{Endpoint, StreamMessage};

// =============================================================================
// Backend Kind
// =============================================================================

/// Available transport implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Persistent-connection primitive that frames events itself.
    #[default]
    EventSource,
    /// Manual chunked read over a streaming HTTP response.
    Fetch,
}

impl BackendKind {
    /// Get the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EventSource => "eventsource",
            Self::Fetch => "fetch",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eventsource" | "event_source" | "event-source" | "native" => Ok(Self::EventSource),
            "fetch" | "manual" => Ok(Self::Fetch),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Unrecognized backend name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stream backend: {0}")]
pub struct UnknownBackend(pub String);

// =============================================================================
// Transport Defaults
// =============================================================================

/// Reconnect behaviour a backend applies when the caller does not override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportDefaults {
    /// Schedule a reconnect after a transport error.
    pub auto_reconnect: bool,
    /// Schedule a reconnect when the server ends the stream cleanly.
    pub reconnect_on_end: bool,
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised while opening or reading a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// A header name or value cannot be sent.
    #[error("invalid request header: {0}")]
    InvalidHeader(String),

    /// Request could not be sent (DNS, TLS, connection refused, ...).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Server answered with a non-success status.
    #[error("HTTP error! status: {0}")]
    Status(u16),

    /// Response carried no body to stream (e.g. `204 No Content`).
    #[error("response has no body")]
    MissingBody,

    /// Reading the body failed mid-stream.
    #[error("stream read failed: {0}")]
    Read(String),

    /// Native event stream reported an error.
    #[error("event stream error: {0}")]
    EventStream(String),

    /// Server closed a stream the transport treats as persistent.
    #[error("stream ended")]
    StreamEnded,
}

/// How a backend run finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The cancellation token fired.
    Cancelled,
    /// The server ended the stream.
    Completed,
}

// =============================================================================
// Ports
// =============================================================================

/// Receives events from a running backend.
pub trait TransportEvents: Send + Sync {
    /// The transport is open and about to deliver messages.
    fn opened(&self);

    /// A message was decoded from the stream.
    fn message(&self, message: StreamMessage);
}

/// A transport that opens an event stream and delivers its messages.
#[async_trait]
pub trait StreamBackend: Send + Sync + 'static {
    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Reconnect behaviour when the caller does not choose one.
    fn defaults(&self) -> TransportDefaults;

    /// Open the stream and deliver messages until it ends, fails, or
    /// `cancel` fires.
    ///
    /// Implementations must call `events.opened()` once the transport is
    /// established and must not deliver messages after cancellation.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the stream cannot be opened or fails
    /// while reading. Cancellation is never an error.
    async fn run(
        &self,
        endpoint: &Endpoint,
        events: &dyn TransportEvents,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, TransportError>;
}
