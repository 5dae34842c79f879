//! Server-Sent Events framing for the manual-read transport.
//!
//! - `decoder`: Accumulates body chunks into complete lines and turns them
//!   into messages
//! - `classify`: Interprets one line (`data:` prefix, heartbeat detection,
//!   JSON validation)

pub mod classify;
pub mod decoder;

pub use classify::{ClassifyError, DATA_PREFIX, Line, classify_line};
pub use decoder::{FrameDecoder, LineBuffer};
