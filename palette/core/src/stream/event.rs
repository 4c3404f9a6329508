//! Event Line Classification
//!
//! Each complete line of the response stream is one of:
//!
//! ```text
//! <blank>                        ignored
//! data: [DONE]                   terminal sentinel (whole-line match only)
//! [data: ]{"response":"Hel",..}  payload; "response" is a text fragment
//! anything else                  malformed, dropped
//! ```
//!
//! The sentinel is compared before any payload parsing, so a line like
//! `data: [DONE] ` (trailing space) is a malformed payload, not a sentinel.

use serde_json::Value;

use crate::error::ChatError;

/// Terminal marker line
pub const DONE_SENTINEL: &str = "data: [DONE]";

/// Optional prefix of payload lines
pub const DATA_PREFIX: &str = "data: ";

/// Payload field carrying the incremental text
pub const RESPONSE_FIELD: &str = "response";

/// Payload field of the service's error event
pub const ERROR_FIELD: &str = "error";

/// What a single complete line means
#[derive(Debug)]
pub enum LineEvent {
    /// Empty or whitespace-only
    Blank,
    /// The terminal sentinel
    Done,
    /// A payload with a non-empty text fragment
    Fragment(String),
    /// A valid payload that carries no fragment
    Ignored,
    /// Not a valid payload
    Malformed(ChatError),
}

/// Classify one complete line (separator already removed)
#[must_use]
pub fn classify_line(line: &str) -> LineEvent {
    if line.trim().is_empty() {
        return LineEvent::Blank;
    }

    if line == DONE_SENTINEL {
        return LineEvent::Done;
    }

    let json = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
    match serde_json::from_str::<Value>(json) {
        Ok(payload) => match payload.get(RESPONSE_FIELD).and_then(Value::as_str) {
            Some(fragment) if !fragment.is_empty() => LineEvent::Fragment(fragment.to_string()),
            _ => LineEvent::Ignored,
        },
        Err(source) => LineEvent::Malformed(ChatError::MalformedEvent {
            line: line.to_string(),
            source,
        }),
    }
}

/// Extract the message of the service's SSE error event from a response body
///
/// Returns `None` unless some line of `body` is an event whose payload has a
/// string `error` field.
#[must_use]
pub fn parse_upstream_error(body: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .filter_map(|json| serde_json::from_str::<Value>(json).ok())
        .find_map(|payload| {
            payload
                .get(ERROR_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}
