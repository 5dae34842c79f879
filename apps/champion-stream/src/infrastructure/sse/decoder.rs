//! Frame Decoder
//!
//! Network reads deliver arbitrary byte chunks. `LineBuffer` holds the
//! trailing partial line between chunks so every line is seen exactly once
//! and whole, regardless of where the chunks were cut. Lines are decoded as
//! UTF-8 only once complete, which keeps multi-byte characters intact when a
//! chunk boundary falls inside one.

use super::classify::{Line, classify_line};
use crate::domain::stream::StreamMessage;
use crate::infrastructure::metrics::{self, DropReason};

// =============================================================================
// Line Buffer
// =============================================================================

/// Accumulates bytes and yields complete `\n`-terminated lines.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Append a chunk and return every line it completes, without the
    /// terminating `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let lines = self.pending[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();

        self.pending.drain(..=last_newline);
        lines
    }

    /// Bytes of the incomplete trailing line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Check if no partial line is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discard the partial line.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// =============================================================================
// Frame Decoder
// =============================================================================

/// Turns body chunks into stream messages.
///
/// Malformed data lines are logged and dropped; decoding continues with the
/// next line.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
}

impl FrameDecoder {
    /// Create a decoder with an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: LineBuffer::new(),
        }
    }

    /// Decode one chunk into the messages it completes, in stream order.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<StreamMessage> {
        let mut messages = Vec::new();

        for line in self.lines.push(chunk) {
            metrics::record_frame();
            match classify_line(&line) {
                Ok(Line::Message(message)) => messages.push(message),
                Ok(Line::Ignored) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e.source,
                        payload = %e.candidate,
                        "Dropping malformed stream frame"
                    );
                    metrics::record_frame_dropped(DropReason::InvalidJson);
                }
            }
        }

        messages
    }

    /// Bytes of the incomplete trailing line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        self.lines.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_holds_partial_line() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        assert_eq!(buffer.pending(), b"data: {\"a\"");

        let lines = buffer.push(b":1}\n\ndata: x");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(buffer.pending(), b"data: x");
    }

    #[test]
    fn line_buffer_keeps_carriage_returns() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"a\r\nb\r\n"), vec!["a\r", "b\r"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn line_buffer_reassembles_split_utf8() {
        let text = "data: {\"name\":\"caf\u{e9}\"}\n";
        let bytes = text.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&bytes[..split]).is_empty());
        assert_eq!(buffer.push(&bytes[split..]), vec![text.trim_end().to_string()]);
    }

    #[test]
    fn decoder_skips_malformed_and_continues() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.decode(b"data: {\"a\":1}\ndata: {broken\ndata: {\"b\":2}\n");
        assert_eq!(
            messages,
            vec![
                StreamMessage::payload("{\"a\":1}"),
                StreamMessage::payload("{\"b\":2}"),
            ]
        );
    }

    #[test]
    fn decoder_emits_heartbeats() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.decode(b"data: heartbeat\n\ndata: {\"type\":\"heartbeat\"}\n");
        assert_eq!(
            messages,
            vec![StreamMessage::Heartbeat, StreamMessage::Heartbeat]
        );
    }

    #[test]
    fn decoder_ignores_other_fields() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.decode(b": keep-alive\nevent: update\nid: 7\nretry: 100\n");
        assert!(messages.is_empty());
    }

    #[test]
    fn unterminated_line_is_not_emitted() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(b"data: {\"a\":1}").is_empty());
        assert_eq!(decoder.pending(), b"data: {\"a\":1}");
    }
}
