//! Wire-frame decoding for the studio SSE stream.
//!
//! The backend separates records with a blank line. Each record carries zero
//! or more `event:` lines (the last one wins) and one or more `data:` lines
//! (joined with `\n`). The decoder is fed raw byte chunks in whatever sizes
//! the transport delivers them and yields complete frames, retaining any
//! trailing partial frame for the next read.

use serde_json::Value;

/// One decoded wire record: an event name and its JSON payload.
///
/// When the data text is not valid JSON the payload is wrapped as
/// `{"raw": <text>}` so nothing is silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: String,
    pub payload: Value,
}

/// Event name assigned when a record carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// Stateful decoder from raw bytes to [`Frame`]s.
///
/// Byte chunks may split frames, lines, or UTF-8 sequences at arbitrary
/// positions; the decoder buffers undecodable suffixes and partial frames
/// across calls. Malformed records never abort the stream: a record with no
/// data lines is skipped, and non-JSON payloads degrade to raw text.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes received but not yet valid as UTF-8 (split multi-byte sequence).
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by a frame separator.
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.decode_bytes(chunk);
        self.drain_complete_frames()
    }

    /// Drain the trailing unterminated frame at end of stream, if any.
    pub fn finish(&mut self) -> Option<Frame> {
        let rest = std::mem::take(&mut self.buffer);
        self.pending_bytes.clear();
        parse_frame(&rest)
    }

    fn decode_bytes(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to marks a UTF-8 boundary, so this cannot fail.
                    let text = std::str::from_utf8(&self.pending_bytes[..valid]).unwrap_or("");
                    self.buffer.push_str(text);
                    self.pending_bytes.drain(..valid);
                    match e.error_len() {
                        // Invalid sequence: drop the offending byte and keep
                        // decoding the rest of the chunk.
                        Some(_) => {
                            self.pending_bytes.remove(0);
                        }
                        // Truncated sequence at the end; wait for more bytes.
                        None => return,
                    }
                }
            }
        }
    }

    fn drain_complete_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some((sep_at, sep_len)) = find_separator(&self.buffer) {
            let raw: String = self.buffer.drain(..sep_at + sep_len).collect();
            let record = &raw[..sep_at];
            match parse_frame(record) {
                Some(frame) => frames.push(frame),
                None => {
                    if !record.trim().is_empty() {
                        tracing::debug!("skipping frame with no data lines");
                    }
                }
            }
        }
        frames
    }
}

/// Locate the earliest blank-line separator, tolerating CRLF framing.
fn find_separator(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|i| (i, 2));
    let crlf = buffer.find("\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse one record's text into a frame. Returns `None` when the record has
/// no data lines (comment-only or blank records).
fn parse_frame(record: &str) -> Option<Frame> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in record.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim());
        } else if let Some(rest) = line.strip_prefix("event:") {
            // Last event: line wins.
            event = Some(rest.trim().to_string());
        }
        // Comments and unknown line formats are ignored.
    }

    if data_lines.is_empty() {
        return None;
    }

    let data = data_lines.join("\n");
    let payload = serde_json::from_str::<Value>(&data)
        .unwrap_or_else(|_| serde_json::json!({ "raw": data }));

    Some(Frame {
        event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        payload,
    })
}
