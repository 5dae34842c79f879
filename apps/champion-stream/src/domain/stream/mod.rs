//! Event Stream Types
//!
//! Core domain types for a long-lived event stream: the endpoint identity
//! used for connection reuse, the connection lifecycle state, and the
//! messages delivered to consumers.
//!
//! These types are transport-agnostic. Backends produce `StreamMessage`
//! values; the stream service fans them out unchanged.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;

// =============================================================================
// Endpoint
// =============================================================================

/// Request headers for a stream endpoint.
///
/// Keys are case-sensitive and unique. A `BTreeMap` keeps structural
/// equality independent of insertion order.
pub type Headers = BTreeMap<String, String>;

/// Target of a logical event stream.
///
/// Two endpoints identify the same stream when their URL and headers are
/// structurally equal. The credentials flag does not participate in reuse
/// decisions.
#[derive(Clone, Default)]
pub struct Endpoint {
    /// Stream URL.
    pub url: String,
    /// Request headers sent when opening the stream.
    pub headers: Headers,
    /// Whether ambient credentials (cookies) accompany the request.
    pub with_credentials: bool,
}

impl Endpoint {
    /// Create an endpoint with no headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Headers::new(),
            with_credentials: false,
        }
    }

    /// Add a header, replacing any previous value for the same key.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Replace all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the credentials flag.
    #[must_use]
    pub const fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Check whether this endpoint identifies the same stream as `other`.
    #[must_use]
    pub fn same_stream(&self, other: &Self) -> bool {
        self.url == other.url && self.headers == other.headers
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.same_stream(other)
    }
}

impl Eq for Endpoint {}

impl fmt::Debug for Endpoint {
    // Header values may carry bearer tokens.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("with_credentials", &self.with_credentials)
            .finish()
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection requested, or explicitly disconnected.
    #[default]
    Idle,
    /// Transport is being opened.
    Connecting,
    /// Transport is open and delivering messages.
    Open,
    /// Transport failed or the stream ended.
    Closed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// Check if the state is `Open`.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Legacy textual form of a heartbeat message.
pub const HEARTBEAT_DATA: &str = r#"{"type":"heartbeat"}"#;

/// Payload text exactly as delivered by the server.
///
/// The original text is kept rather than a re-serialized value so consumers
/// see no incidental reformatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(String);

impl Payload {
    /// Wrap payload text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Get the payload text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the payload as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    /// Deserialize the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    /// Consume the payload and return the text.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// A message delivered to stream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Liveness signal carrying no application data.
    Heartbeat,
    /// Application payload.
    Payload(Payload),
}

impl StreamMessage {
    /// Create a payload message.
    #[must_use]
    pub fn payload(text: impl Into<String>) -> Self {
        Self::Payload(Payload::new(text))
    }

    /// Check if this is a heartbeat.
    #[must_use]
    pub const fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }

    /// Get the payload, if any.
    #[must_use]
    pub const fn as_payload(&self) -> Option<&Payload> {
        match self {
            Self::Heartbeat => None,
            Self::Payload(payload) => Some(payload),
        }
    }

    /// Render the message in its legacy textual form.
    ///
    /// Heartbeats render as `{"type":"heartbeat"}`.
    #[must_use]
    pub fn data(&self) -> Cow<'_, str> {
        match self {
            Self::Heartbeat => Cow::Borrowed(HEARTBEAT_DATA),
            Self::Payload(payload) => Cow::Borrowed(payload.as_str()),
        }
    }

    /// Metric label for this message kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Payload(_) => "payload",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_equality_ignores_header_order() {
        let a = Endpoint::new("https://example.test/sse")
            .with_header("Authorization", "Bearer t")
            .with_header("champion-url", "http://upstream/");
        let b = Endpoint::new("https://example.test/sse")
            .with_header("champion-url", "http://upstream/")
            .with_header("Authorization", "Bearer t");
        assert_eq!(a, b);
    }

    #[test]
    fn endpoint_equality_ignores_credentials_flag() {
        let a = Endpoint::new("https://example.test/sse").with_credentials(true);
        let b = Endpoint::new("https://example.test/sse");
        assert!(a.same_stream(&b));
    }

    #[test]
    fn endpoint_header_keys_are_case_sensitive() {
        let a = Endpoint::new("https://example.test/sse").with_header("Accept", "x");
        let b = Endpoint::new("https://example.test/sse").with_header("accept", "x");
        assert_ne!(a, b);
    }

    #[test]
    fn endpoint_debug_hides_header_values() {
        let endpoint =
            Endpoint::new("https://example.test/sse").with_header("Authorization", "Bearer s3cret");
        let debug = format!("{endpoint:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn heartbeat_renders_legacy_data() {
        assert_eq!(StreamMessage::Heartbeat.data(), HEARTBEAT_DATA);
        assert!(StreamMessage::Heartbeat.as_payload().is_none());
    }

    #[test]
    fn payload_keeps_original_text() {
        let message = StreamMessage::payload(r#"{ "a" : 1 }"#);
        assert_eq!(message.data(), r#"{ "a" : 1 }"#);
        let value = message.as_payload().unwrap().json().unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn connection_state_names() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
    }
}
