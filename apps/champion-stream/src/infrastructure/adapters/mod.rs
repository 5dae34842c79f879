//! Domain Adapters
//!
//! Thin wrappers that give consumers a shape-specific view of a shared
//! `StreamService`. Each adapter keeps a map from the consumer's handler to
//! the wrapping handler it registered, so consumers remove handlers by the
//! identity they passed in.

pub mod balance;
pub mod sse;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::services::MessageHandler;

pub use balance::{BalanceHandler, BalanceStreamAdapter, balance_handler};
pub use sse::{SseEvent, SseHandler, SseOptions, SseServiceAdapter, sse_handler};

/// Consumer handler to registered wrapper, keyed by `Arc` identity.
///
/// A consumer maps to at most one wrapper. The service registry also
/// deduplicates by identity, so reusing the wrapper keeps a consumer
/// registered once no matter how often it connects.
struct WrappedHandlers<C: ?Sized> {
    entries: Mutex<Vec<(Arc<C>, MessageHandler)>>,
}

impl<C: ?Sized> WrappedHandlers<C> {
    const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Wrapper for `consumer`, created with `wrap` on first use.
    fn wrapper_for(
        &self,
        consumer: &Arc<C>,
        wrap: impl FnOnce() -> MessageHandler,
    ) -> MessageHandler {
        let mut entries = self.entries.lock();
        if let Some((_, wrapped)) = entries.iter().find(|(c, _)| Arc::ptr_eq(c, consumer)) {
            return Arc::clone(wrapped);
        }
        let wrapped = wrap();
        entries.push((Arc::clone(consumer), Arc::clone(&wrapped)));
        wrapped
    }

    /// Forget `consumer`, returning its wrapper.
    fn take(&self, consumer: &Arc<C>) -> Option<MessageHandler> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|(c, _)| Arc::ptr_eq(c, consumer))?;
        Some(entries.remove(index).1)
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
