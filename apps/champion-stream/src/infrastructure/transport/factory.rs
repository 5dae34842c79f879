//! Backend Factory
//!
//! Chooses a transport implementation by `BackendKind`. Both backends share
//! one pair of HTTP clients, so connection pools and cookies are reused.

use std::sync::Arc;
use std::time::Duration;

use super::{EventSourceBackend, FetchBackend, HttpClients};
use crate::application::ports::{BackendKind, StreamBackend, TransportError};
use crate::application::services::{ReconnectConfig, StreamService};

/// Creates stream backends and services.
#[derive(Debug, Clone)]
pub struct StreamFactory {
    clients: HttpClients,
}

impl StreamFactory {
    /// Create a factory with the given connect timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            clients: HttpClients::new(connect_timeout)?,
        })
    }

    /// Create a backend of `kind`.
    #[must_use]
    pub fn create(&self, kind: BackendKind) -> Arc<dyn StreamBackend> {
        match kind {
            BackendKind::EventSource => Arc::new(self.event_source()),
            BackendKind::Fetch => Arc::new(self.fetch()),
        }
    }

    /// Create the native-transport backend.
    #[must_use]
    pub fn event_source(&self) -> EventSourceBackend {
        EventSourceBackend::with_clients(self.clients.clone())
    }

    /// Create the manual-read backend.
    #[must_use]
    pub fn fetch(&self) -> FetchBackend {
        FetchBackend::with_clients(self.clients.clone())
    }

    /// Create a stream service over a backend of `kind`.
    #[must_use]
    pub fn service(&self, kind: BackendKind, config: ReconnectConfig) -> StreamService {
        tracing::debug!(backend = %kind, "Creating stream service");
        StreamService::new(self.create(kind), config)
    }
}
