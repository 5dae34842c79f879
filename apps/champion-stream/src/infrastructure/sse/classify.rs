//! Line Classifier
//!
//! Only `data:` lines carry meaning. Any payload mentioning `heartbeat` is a
//! keep-alive and is never parsed; everything else must be valid JSON.

use serde::de::IgnoredAny;

use crate::domain::stream::StreamMessage;

/// Prefix of a data line, including the mandatory space.
pub const DATA_PREFIX: &str = "data: ";

/// Marker that identifies a keep-alive payload.
const HEARTBEAT_MARKER: &str = "heartbeat";

/// Why a data line was rejected.
#[derive(Debug, thiserror::Error)]
#[error("invalid JSON payload: {source}")]
pub struct ClassifyError {
    /// Payload text after the prefix, trimmed.
    pub candidate: String,
    /// Parser error.
    #[source]
    pub source: serde_json::Error,
}

/// Interpretation of one complete line.
#[derive(Debug)]
pub enum Line {
    /// Blank, comment, or non-data field.
    Ignored,
    /// A message ready for dispatch.
    Message(StreamMessage),
}

/// Classify one complete line, without its terminating newline.
///
/// The prefix is matched against the line as delivered, so a line with
/// leading whitespace is not a data line. Heartbeat detection wins over JSON
/// validation: `data: heartbeat` and `data: {"type":"heartbeat"}` are both
/// heartbeats.
///
/// # Errors
///
/// Returns `ClassifyError` when a non-heartbeat data payload is not JSON.
pub fn classify_line(line: &str) -> Result<Line, ClassifyError> {
    if line.trim().is_empty() {
        return Ok(Line::Ignored);
    }

    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(Line::Ignored);
    };

    let candidate = rest.trim();
    if candidate.contains(HEARTBEAT_MARKER) {
        return Ok(Line::Message(StreamMessage::Heartbeat));
    }

    match serde_json::from_str::<IgnoredAny>(candidate) {
        Ok(_) => Ok(Line::Message(StreamMessage::payload(candidate))),
        Err(source) => Err(ClassifyError {
            candidate: candidate.to_string(),
            source,
        }),
    }
}
