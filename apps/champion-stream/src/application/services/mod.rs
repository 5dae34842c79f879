//! Application Services
//!
//! Services that own the stream lifecycle and coordinate between ports.
//!
//! - `StreamService`: Connection reuse, handler fan-out, reconnect scheduling
//! - `HandlerRegistry`: Ordered handler set with guarded dispatch
//! - `ReconnectPolicy`: Delay schedule for reconnect attempts
//! - `StreamStatus`: Activity snapshot for dashboards and health checks

pub mod reconnect;
pub mod registry;
pub mod status;
pub mod stream;

pub use reconnect::{DEFAULT_RECONNECT_INTERVAL, ReconnectConfig, ReconnectPolicy};
pub use registry::{DispatchReport, HandlerRegistry, MessageHandler, message_handler};
pub use status::{StatusSnapshot, StreamStatus};
pub use stream::{
    ConnectRequest, ErrorCallback, OpenCallback, ReconnectOverrides, StreamService, Subscription,
};
