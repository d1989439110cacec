//! Protocol I/O for JSONL envelope parsing and serialization
//!
//! This module provides:
//! - `parse_message` / `parse_message_graceful` for parsing envelopes
//! - `serialize_message` for writing envelopes
//! - `JsonlReader` for streaming JSONL reads

use std::io::{BufRead, BufReader, Read};
use tracing::{debug, warn};

use super::message::AppMessage;

/// Maximum length for raw JSON in logs (prevents huge data: URIs in logs)
const MAX_RAW_LOG_PREVIEW: usize = 200;

/// Get a truncated preview of raw JSON for logging
pub fn log_preview(raw: &str) -> (&str, usize) {
    let len = raw.len();
    if len <= MAX_RAW_LOG_PREVIEW {
        return (raw, len);
    }
    let mut end = MAX_RAW_LOG_PREVIEW;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    (&raw[..end], len)
}

/// Parse a single JSONL envelope
pub fn parse_message(line: &str) -> Result<AppMessage, serde_json::Error> {
    serde_json::from_str(line).map_err(|e| {
        let (preview, raw_len) = log_preview(line);
        warn!(raw_preview = %preview, raw_len, error = %e, "Failed to parse JSONL envelope");
        e
    })
}

/// Result type for graceful envelope parsing
#[derive(Debug)]
pub enum ParseResult {
    /// Parsed envelope (unknown channels parse fine as `Channel::Other`)
    Ok(AppMessage),
    /// Valid JSON object without a "channel" field
    MissingChannel {
        /// Truncated raw JSON for debugging
        raw: String,
    },
    /// Has a channel but the payload doesn't fit the envelope shape
    InvalidPayload {
        channel: String,
        error: String,
        raw: String,
    },
    /// JSON syntax error
    ParseError(serde_json::Error),
}

/// Parse an envelope, classifying failures instead of bubbling them
///
/// Parses to `serde_json::Value` first so the channel can be reported even
/// when the rest of the payload is malformed.
pub fn parse_message_graceful(line: &str) -> ParseResult {
    let (preview, _raw_len) = log_preview(line);

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return ParseResult::ParseError(e),
    };

    let channel = match value.get("channel").and_then(|c| c.as_str()) {
        Some(c) => c.to_string(),
        None => {
            return ParseResult::MissingChannel {
                raw: preview.to_string(),
            }
        }
    };

    match serde_json::from_value::<AppMessage>(value) {
        Ok(msg) => ParseResult::Ok(msg),
        Err(e) => ParseResult::InvalidPayload {
            channel,
            error: e.to_string(),
            raw: preview.to_string(),
        },
    }
}

/// Serialize an envelope to one JSON line (without the trailing newline)
pub fn serialize_message(msg: &AppMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// JSONL reader for streaming envelope reads
///
/// Reuses one line buffer across reads. Lines are read as bytes so a line
/// that is not UTF-8 is skipped like any other malformed line.
pub struct JsonlReader<R: Read> {
    reader: BufReader<R>,
    line_buffer: Vec<u8>,
}

impl<R: Read> JsonlReader<R> {
    pub fn new(reader: R) -> Self {
        JsonlReader {
            reader: BufReader::new(reader),
            line_buffer: Vec::with_capacity(1024),
        }
    }

    /// Read the next envelope, skipping blank and malformed lines
    ///
    /// # Returns
    /// * `Ok(Some(msg))` - next well-formed envelope
    /// * `Ok(None)` - end of stream
    /// * `Err(e)` - I/O error on the underlying reader
    pub fn next_message_graceful(&mut self) -> Result<Option<AppMessage>, std::io::Error> {
        loop {
            self.line_buffer.clear();
            if self.reader.read_until(b'\n', &mut self.line_buffer)? == 0 {
                debug!("Reached end of JSONL stream");
                return Ok(None);
            }

            let line = match std::str::from_utf8(&self.line_buffer) {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        error = %e,
                        raw_len = self.line_buffer.len(),
                        "Skipping line that is not valid UTF-8"
                    );
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let (preview, raw_len) = log_preview(trimmed);
            match parse_message_graceful(trimmed) {
                ParseResult::Ok(msg) => return Ok(Some(msg)),
                ParseResult::MissingChannel { .. } => {
                    warn!(raw_preview = %preview, raw_len, "Skipping envelope with no 'channel'");
                }
                ParseResult::InvalidPayload { channel, error, .. } => {
                    warn!(
                        channel = %channel,
                        error = %error,
                        raw_preview = %preview,
                        raw_len,
                        "Skipping envelope with invalid payload"
                    );
                }
                ParseResult::ParseError(e) => {
                    warn!(
                        error = %e,
                        raw_preview = %preview,
                        raw_len,
                        "Skipping malformed JSON line"
                    );
                }
            }
        }
    }
}
