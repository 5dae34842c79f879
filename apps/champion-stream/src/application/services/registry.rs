//! Handler Registry
//!
//! Ordered set of message handlers sharing one physical connection.
//! Handler identity is pointer identity of the `Arc`, not structural
//! equality: registering the same handler twice is a no-op, while two
//! closures with identical code are distinct handlers.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::domain::stream::StreamMessage;
use crate::infrastructure::metrics;

/// Consumer callback invoked for every dispatched message.
pub type MessageHandler = Arc<dyn Fn(&StreamMessage) + Send + Sync>;

/// Wrap a closure as a `MessageHandler`.
pub fn message_handler<F>(f: F) -> MessageHandler
where
    F: Fn(&StreamMessage) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registered handlers in registration order.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<MessageHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a handler and return the registry size.
    pub fn add(&mut self, handler: MessageHandler) -> usize {
        if !self.contains(&handler) {
            self.handlers.push(handler);
        }
        self.handlers.len()
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn remove(&mut self, handler: &MessageHandler) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| !Arc::ptr_eq(h, handler));
        self.handlers.len() != before
    }

    /// Check if a handler is registered.
    #[must_use]
    pub fn contains(&self, handler: &MessageHandler) -> bool {
        self.handlers.iter().any(|h| Arc::ptr_eq(h, handler))
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Remove all handlers.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Copy of the current handler list, for dispatch outside a lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MessageHandler> {
        self.handlers.clone()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("len", &self.handlers.len())
            .finish()
    }
}

/// Outcome of delivering one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned normally.
    pub delivered: usize,
    /// Handlers that panicked.
    pub failed: usize,
}

/// Invoke each handler in order with `message`.
///
/// Every invocation is guarded independently, so a panicking handler does
/// not suppress delivery to the handlers after it. Delivery stops as soon as
/// `cancel` fires.
pub fn dispatch(
    handlers: &[MessageHandler],
    message: &StreamMessage,
    cancel: &CancellationToken,
) -> DispatchReport {
    let started = Instant::now();
    let mut report = DispatchReport::default();

    for handler in handlers {
        if cancel.is_cancelled() {
            break;
        }

        match catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(()) => report.delivered += 1,
            Err(panic) => {
                report.failed += 1;
                metrics::record_handler_failure();
                tracing::error!(
                    kind = message.kind(),
                    reason = %panic_reason(panic.as_ref()),
                    "Stream message handler failed"
                );
            }
        }
    }

    if report.delivered > 0 {
        metrics::record_message_dispatched(message.kind());
        metrics::record_dispatch_duration(started.elapsed());
    }

    report
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
