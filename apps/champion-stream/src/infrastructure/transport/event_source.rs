//! Native-Transport Backend
//!
//! SSE framing is delegated to `eventsource-stream`, which handles the full
//! field grammar (`event:`, `id:`, multi-line `data:`). Events of type
//! `message` are forwarded unchanged as payloads. The stream is treated as
//! persistent: its end is reported as an error so the service reconnects.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{DEFAULT_CONNECT_TIMEOUT, HttpClients, request_headers};
use crate::application::ports::{
    BackendKind, StreamBackend, StreamEnd, TransportDefaults, TransportError, TransportEvents,
};
use crate::domain::stream::{Endpoint, StreamMessage};
use crate::infrastructure::metrics::{self, DropReason};

const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept", "text/event-stream"),
    ("cache-control", "no-cache"),
];

/// Event type of unnamed events.
const MESSAGE_EVENT: &str = "message";

/// Backend using an SSE client library for framing.
#[derive(Debug, Clone)]
pub struct EventSourceBackend {
    clients: HttpClients,
}

impl EventSourceBackend {
    /// Create a backend with default client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self::with_clients(HttpClients::new(DEFAULT_CONNECT_TIMEOUT)?))
    }

    /// Create a backend over existing clients.
    #[must_use]
    pub const fn with_clients(clients: HttpClients) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl StreamBackend for EventSourceBackend {
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
        endpoint: &Endpoint,
        events: &dyn TransportEvents,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, TransportError> {
        let headers = request_headers(DEFAULT_HEADERS, endpoint)?;
        let request = self
            .clients
            .for_endpoint(endpoint)
            .get(&endpoint.url)
            .headers(headers);

        let response = tokio::select! {
            () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            result = request.send() => result.map_err(|e| TransportError::Connect(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        events.opened();

        let mut stream = response.bytes_stream().eventsource();

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if !event.event.is_empty() && event.event != MESSAGE_EVENT {
                        tracing::debug!(event = %event.event, "Ignoring named stream event");
                        metrics::record_frame_dropped(DropReason::UnhandledEvent);
                        continue;
                    }
                    if cancel.is_cancelled() {
                        return Ok(StreamEnd::Cancelled);
                    }
                    events.message(StreamMessage::payload(event.data));
                }
                Some(Err(e)) => return Err(TransportError::EventStream(e.to_string())),
                None => return Err(TransportError::StreamEnded),
            }
        }
    }
}
