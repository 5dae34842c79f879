#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Champion Stream - Event Stream Ingestion Client
//!
//! Opens one long-lived server-sent event stream per endpoint, decodes the
//! newline-framed `data:` protocol into JSON payloads and heartbeats, and
//! fans messages out to any number of consumers over a single connection,
//! reconnecting transparently after failures.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Stream types and payload normalization
//!   - `stream`: Endpoint, connection state, messages
//!   - `balance`: Balance shape detection and defaults
//!   - `trade`: Trade progress payloads
//!
//! - **Application**: Stream lifecycle and port definitions
//!   - `ports`: Transport backend interface
//!   - `services`: Stream service, handler registry, reconnect policy, status
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `sse`: Line buffer, frame decoder, line classifier
//!   - `transport`: Native and manual-read HTTP backends, factory
//!   - `adapters`: Balance and legacy SSE consumer views
//!   - `config`: Configuration from the environment
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                ┌─────────────┐     ┌────────────────┐      ┌──────────┐
//! SSE server ───►│   Backend   │────►│ StreamService  │─────►│ Handler 1│
//!                │ (eventsource│     │ (registry,     │─────►│ Adapter  │
//!                │  or fetch)  │     │  reconnect)    │─────►│ Handler N│
//!                └─────────────┘     └────────────────┘      └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core stream types with no transport dependencies.
pub mod domain;

/// Application layer - Stream lifecycle and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::balance::{BalanceShape, BalanceUpdate, normalize_balance};
pub use domain::stream::{ConnectionState, Endpoint, Headers, Payload, StreamMessage};
pub use domain::trade::TradeUpdate;

// Ports
pub use application::ports::{
    BackendKind, StreamBackend, StreamEnd, TransportDefaults, TransportError, TransportEvents,
};

// Services
pub use application::services::{
    ConnectRequest, MessageHandler, ReconnectConfig, ReconnectPolicy, StatusSnapshot,
    StreamService, StreamStatus, Subscription, message_handler,
};

// Transports
pub use infrastructure::transport::{EventSourceBackend, FetchBackend, StreamFactory};

// Adapters
pub use infrastructure::adapters::{BalanceStreamAdapter, SseEvent, SseOptions, SseServiceAdapter};

// Infrastructure config
pub use infrastructure::config::{ConfigError, StreamConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
