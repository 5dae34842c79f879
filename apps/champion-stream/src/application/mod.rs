//! Application Layer - Stream lifecycle and port definitions.
//!
//! This layer contains the stream service and the port interfaces that
//! define how it drives the transport backends.

/// Port interfaces for transport backends.
pub mod ports;

/// Stream lifecycle, handler fan-out, reconnect and status services.
pub mod services;
