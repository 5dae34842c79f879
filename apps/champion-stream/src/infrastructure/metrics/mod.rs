//! Prometheus Metrics Module
//!
//! Exposes stream metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Complete lines read from the manual-read transport
//! - **Messages**: Dispatched messages by kind, dropped frames by reason
//! - **Connection**: Open gauge, transport errors, reconnect attempts
//! - **Consumers**: Handler failures and dispatch latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Every
//! recording function is a no-op until `init_metrics` installs a recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame and message counters
    describe_counter!(
        "champion_stream_frames_total",
        "Total complete lines read from the stream body"
    );
    describe_counter!(
        "champion_stream_messages_dispatched_total",
        "Total messages delivered to at least one handler"
    );
    describe_counter!(
        "champion_stream_frames_dropped_total",
        "Total frames discarded by reason"
    );

    // Consumer counters
    describe_counter!(
        "champion_stream_handler_failures_total",
        "Total message handler invocations that panicked"
    );

    // Connection metrics
    describe_gauge!(
        "champion_stream_connected",
        "Whether the event stream transport is open (1) or not (0)"
    );
    describe_counter!(
        "champion_stream_transport_errors_total",
        "Total transport failures by backend"
    );
    describe_counter!(
        "champion_stream_reconnects_total",
        "Total reconnection attempts"
    );

    // Latency histograms
    describe_histogram!(
        "champion_stream_dispatch_seconds",
        "Time to deliver one message to every handler"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Reasons a frame is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// `data:` payload was not valid JSON.
    InvalidJson,
    /// Native event type other than `message`.
    UnhandledEvent,
}

impl DropReason {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::UnhandledEvent => "unhandled_event",
        }
    }
}

/// Record a complete line read from the stream.
pub fn record_frame() {
    counter!("champion_stream_frames_total").increment(1);
}

/// Record a message delivered to handlers.
pub fn record_message_dispatched(kind: &'static str) {
    counter!(
        "champion_stream_messages_dispatched_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a discarded frame.
pub fn record_frame_dropped(reason: DropReason) {
    counter!(
        "champion_stream_frames_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a handler that panicked.
pub fn record_handler_failure() {
    counter!("champion_stream_handler_failures_total").increment(1);
}

/// Record a transport failure.
pub fn record_transport_error(backend: &'static str) {
    counter!(
        "champion_stream_transport_errors_total",
        "backend" => backend
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("champion_stream_reconnects_total").increment(1);
}

/// Update the connection gauge.
pub fn set_connected(connected: bool) {
    gauge!("champion_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record how long one dispatch took.
pub fn record_dispatch_duration(duration: Duration) {
    histogram!("champion_stream_dispatch_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
