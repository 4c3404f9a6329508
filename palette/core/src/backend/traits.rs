//! Chat Backend Traits
//!
//! The seam between request orchestration and the network. The orchestration
//! only needs two things from a service: a raw byte stream for a chat turn,
//! and an image payload for a prompt. Everything about framing and
//! transcript mutation stays on this side of the trait, so a test backend
//! can replay any chunking it likes.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::messages::Message;

/// Raw response body of a chat turn, chunked however the transport delivers it
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Content type assumed when an image response does not declare one
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/png";

/// Body of an outbound chat request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation history, oldest first
    pub messages: Vec<Message>,
}

impl ChatRequest {
    /// Create a request carrying `messages`
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Body of an outbound image request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Text description of the image
    pub prompt: String,
}

impl ImageRequest {
    /// Create a request for `prompt`
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Binary image returned by the service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePayload {
    /// MIME type, e.g. `image/png`
    pub content_type: String,
    /// Encoded image bytes
    pub bytes: Bytes,
}

impl ImagePayload {
    /// Wrap raw bytes
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Encode as a `data:` URL suitable for an image message
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }

    /// Decode a base64 `data:` URL
    ///
    /// Returns `None` for anything that is not a base64 data URL.
    #[must_use]
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (meta, encoded) = rest.split_once(',')?;
        let content_type = meta.strip_suffix(";base64")?;
        let bytes = STANDARD.decode(encoded).ok()?;
        Some(Self::new(content_type, bytes))
    }

    /// File extension matching the content type
    #[must_use]
    pub fn file_extension(&self) -> &'static str {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

/// Chat service backend
///
/// Implement this trait to talk to a different service, or to replay canned
/// responses in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Send a chat turn and return the response body as it arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent, the service answered
    /// with a non-success status, or the body is absent.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Generate an image for a prompt
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the image is empty.
    async fn generate_image(&self, request: &ImageRequest) -> Result<ImagePayload>;
}
