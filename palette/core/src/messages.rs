//! Conversation Messages
//!
//! The unit of the transcript. A message is created once and then only ever
//! changed through the transcript store; the fields that identify it (`id`,
//! `created_at`, `type`) never change, and `streaming` only goes from `true`
//! to `false`.
//!
//! The serialized form is the wire shape the chat service expects:
//!
//! ```json
//! {
//!   "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
//!   "role": "assistant",
//!   "content": "Hello",
//!   "created_at": "2026-10-19T12:00:00Z",
//!   "streaming": false,
//!   "type": "text"
//! }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Model output
    Assistant,
    /// Instructions injected ahead of the conversation
    System,
}

/// Payload kind, fixed at creation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text
    #[default]
    Text,
    /// Image, content is a data URL
    Image,
    /// Audio, content is an opaque reference
    Audio,
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Text, or a reference for non-text payloads
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Whether fragments are still arriving
    pub streaming: bool,
    /// Payload kind
    #[serde(rename = "type", default)]
    pub content_type: ContentType,
}

impl Message {
    /// Create a finished text message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            streaming: false,
            content_type: ContentType::Text,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create an empty assistant message that fragments will be streamed into
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            streaming: true,
            ..Self::new(MessageRole::Assistant, String::new())
        }
    }

    /// Create an assistant image message from a data URL
    pub fn image(data_url: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Image,
            ..Self::new(MessageRole::Assistant, data_url)
        }
    }

    /// Append one fragment of content
    pub fn push_fragment(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }

    /// Stop streaming, keeping the content
    pub fn finish(&mut self) {
        self.streaming = false;
    }

    /// Stop streaming and replace the content with an error indicator
    pub fn fail(&mut self, error_text: &str) {
        error_text.clone_into(&mut self.content);
        self.streaming = false;
    }

    /// Whether the content is plain text
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.content_type == ContentType::Text
    }
}
