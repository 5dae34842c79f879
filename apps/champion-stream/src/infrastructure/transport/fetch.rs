//! Manual-Read Backend
//!
//! Issues one streaming GET and decodes the body itself with
//! `FrameDecoder`. Only `data:` lines are interpreted. By default neither a
//! failed open nor the end of the body schedules a reconnect.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use super::{DEFAULT_CONNECT_TIMEOUT, HttpClients, request_headers};
use crate::application::ports::{
    BackendKind, StreamBackend, StreamEnd, TransportDefaults, TransportError, TransportEvents,
};
use crate::domain::stream::Endpoint;
use crate::infrastructure::sse::FrameDecoder;

/// Protocol headers sent before any caller headers.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];

/// Streaming-GET backend with in-process SSE framing.
#[derive(Debug, Clone)]
pub struct FetchBackend {
    clients: HttpClients,
}

impl FetchBackend {
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
impl StreamBackend for FetchBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fetch
    }

    fn defaults(&self) -> TransportDefaults {
        TransportDefaults {
            auto_reconnect: false,
            reconnect_on_end: false,
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
        if status == StatusCode::NO_CONTENT {
            return Err(TransportError::MissingBody);
        }

        tracing::debug!(url = %endpoint.url, status = status.as_u16(), "Stream response received");
        events.opened();

        let mut body = response.bytes_stream();
        let mut decoder = FrameDecoder::new();

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for message in decoder.decode(&chunk) {
                        if cancel.is_cancelled() {
                            return Ok(StreamEnd::Cancelled);
                        }
                        events.message(message);
                    }
                }
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
                None => {
                    tracing::debug!(
                        url = %endpoint.url,
                        discarded_bytes = decoder.pending().len(),
                        "Stream body complete"
                    );
                    return Ok(StreamEnd::Completed);
                }
            }
        }
    }
}
