//! Trade Update Messages
//!
//! Typed form of the trade progress payloads pushed on the bot event stream.

use serde::{Deserialize, Serialize};

/// Progress update for a running trading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    /// Account login the session trades on.
    pub login_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Error text reported by the session, empty when healthy.
    #[serde(default)]
    pub error: String,
    /// Trading session identifier.
    pub session_id: String,
    /// Strategy name (e.g. "martingale", "threshold").
    pub strategy: String,
    /// Strategy-specific trade details.
    #[serde(default)]
    pub trade_info: serde_json::Value,
    /// Whether the session has finished.
    #[serde(default)]
    pub is_completed: bool,
}

impl TradeUpdate {
    /// Check if the session reported an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}
