//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Balance and legacy SSE views over a stream service.
pub mod adapters;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Server-sent event line framing and classification.
pub mod sse;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// HTTP transport backends and factory.
pub mod transport;
