//! Transport Backends
//!
//! Concrete `StreamBackend` implementations over `reqwest`.
//!
//! - `EventSourceBackend`: SSE framing by `eventsource-stream`, reconnects
//!   after errors by default
//! - `FetchBackend`: manual chunked read through `FrameDecoder`, no
//!   reconnect by default
//! - `StreamFactory`: selects a backend by `BackendKind`

pub mod event_source;
pub mod factory;
pub mod fetch;

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::application::ports::TransportError;
use crate::domain::stream::Endpoint;

pub use event_source::EventSourceBackend;
pub use factory::StreamFactory;
pub use fetch::FetchBackend;

/// Default TCP/TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP clients for stream requests.
///
/// Requests for endpoints with `with_credentials` go through a client that
/// keeps a cookie store; all others use a client without one. No total
/// request timeout is set since streams are long-lived.
#[derive(Debug, Clone)]
pub struct HttpClients {
    plain: Client,
    credentialed: Client,
}

impl HttpClients {
    /// Build both clients.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Client` if the TLS backend cannot be
    /// initialised.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let build = |cookies: bool| {
            Client::builder()
                .connect_timeout(connect_timeout)
                .cookie_store(cookies)
                .build()
                .map_err(|e| TransportError::Client(e.to_string()))
        };

        Ok(Self {
            plain: build(false)?,
            credentialed: build(true)?,
        })
    }

    /// Client to use for `endpoint`.
    #[must_use]
    pub const fn for_endpoint(&self, endpoint: &Endpoint) -> &Client {
        if endpoint.with_credentials {
            &self.credentialed
        } else {
            &self.plain
        }
    }
}

/// Build request headers: `defaults` first, then the endpoint's headers on
/// top. Header names compare case-insensitively, so a caller-supplied
/// `accept` replaces a default `Accept`.
pub(crate) fn request_headers(
    defaults: &[(&'static str, &'static str)],
    endpoint: &Endpoint,
) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    for &(name, value) in defaults {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    for (name, value) in &endpoint.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        if name == reqwest::header::AUTHORIZATION {
            value.set_sensitive(true);
        }
        headers.insert(name, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &[(&str, &str)] = &[("accept", "text/event-stream"), ("cache-control", "no-cache")];

    #[test]
    fn caller_headers_override_defaults() {
        let endpoint = Endpoint::new("http://stream.test")
            .with_header("Accept", "application/json")
            .with_header("champion-url", "http://upstream/");
        let headers = request_headers(DEFAULTS, &endpoint).unwrap();

        assert_eq!(headers["accept"], "application/json");
        assert_eq!(headers["cache-control"], "no-cache");
        assert_eq!(headers["champion-url"], "http://upstream/");
    }

    #[test]
    fn authorization_is_marked_sensitive() {
        let endpoint =
            Endpoint::new("http://stream.test").with_header("Authorization", "Bearer token");
        let headers = request_headers(DEFAULTS, &endpoint).unwrap();
        assert!(headers["authorization"].is_sensitive());
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let endpoint = Endpoint::new("http://stream.test").with_header("bad header", "x");
        assert_eq!(
            request_headers(DEFAULTS, &endpoint).unwrap_err(),
            TransportError::InvalidHeader("bad header".to_string())
        );
    }
}
