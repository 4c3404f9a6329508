//! Error Types
//!
//! A single error enum covers the chat core. The stream-level kinds are:
//!
//! - **MalformedEvent**: a complete line that failed payload parsing. The
//!   ingestor logs and drops it; it never reaches a caller.
//! - **Transport / Status**: network failure or a non-success status.
//! - **EmptyBody**: a success status with nothing to read.
//! - **Upstream**: the service answered with its SSE error event.
//!
//! The remaining variants report invalid input to the transcript store and
//! the orchestration layer.

use thiserror::Error;

use crate::config::ConfigError;
use crate::messages::MessageId;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors produced by the chat core
#[derive(Debug, Error)]
pub enum ChatError {
    /// A complete event line that is not a valid payload
    #[error("malformed event line {line:?}: {source}")]
    MalformedEvent {
        /// The offending line, without its separator
        line: String,
        /// The parse failure
        source: serde_json::Error,
    },

    /// Network-level failure talking to the service
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The service answered successfully but sent no body
    #[error("service returned an empty response body")]
    EmptyBody,

    /// The service reported its own failure as an SSE error event
    #[error("upstream service error: {0}")]
    Upstream(String),

    /// No message with this id exists in the transcript
    #[error("message {0} not found in transcript")]
    NotFound(MessageId),

    /// A message with this id is already in the transcript
    #[error("message {0} is already in the transcript")]
    DuplicateId(MessageId),

    /// An update would break a message invariant
    #[error("rejected update to message {id}: {reason}")]
    InvalidUpdate {
        /// Target message
        id: MessageId,
        /// Which invariant the update broke
        reason: &'static str,
    },

    /// The user input was blank
    #[error("input is empty")]
    EmptyInput,

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ChatError {
    /// Whether this error ends a stream (as opposed to being recovered locally)
    #[must_use]
    pub fn is_fatal_for_stream(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::EmptyBody | Self::Upstream(_)
        )
    }
}
