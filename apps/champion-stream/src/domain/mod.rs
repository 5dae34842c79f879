//! Domain Layer - Core stream types and payload normalization.
//!
//! This layer contains the core domain types for event streaming with no
//! transport dependencies.

/// Balance payload shape detection and normalization.
pub mod balance;

/// Endpoint, connection state, and message types.
pub mod stream;

/// Trade progress payloads.
pub mod trade;
