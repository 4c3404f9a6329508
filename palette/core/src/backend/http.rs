//! HTTP Backend Implementation
//!
//! Talks to the chat service over plain HTTP with reqwest.
//!
//! # Service API
//!
//! - `POST {chat_path}` with `{"messages": [...]}`: event-stream body
//! - `POST {image_path}` with `{"prompt": "..."}`: binary image body
//!
//! A failing chat turn answers with a fixed status and a single SSE error
//! event instead of a stream; that body is classified as
//! [`ChatError::Upstream`] so callers can tell it from a proxy error page.
//!
//! Only the connect phase has a client-wide timeout. A chat stream may run
//! as long as the model keeps talking; image requests get their own
//! per-request timeout.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;

use super::traits::{
    ByteStream, ChatBackend, ChatRequest, ImagePayload, ImageRequest, DEFAULT_IMAGE_CONTENT_TYPE,
};
use crate::error::{ChatError, Result};
use crate::stream::parse_upstream_error;

/// Default service address (a local worker dev server)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";

/// Where the service lives and how long to wait for it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Scheme, host and port, without a trailing slash
    pub base_url: String,
    /// Path of the chat endpoint
    pub chat_path: String,
    /// Path of the image endpoint
    pub image_path: String,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Time allowed for a whole image request
    pub image_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_path: "/api/chat".to_string(),
            image_path: "/api/image".to_string(),
            connect_timeout: Duration::from_secs(10),
            image_timeout: Duration::from_secs(120),
        }
    }
}

impl ServiceConfig {
    /// Full URL of the chat endpoint
    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_path)
    }

    /// Full URL of the image endpoint
    #[must_use]
    pub fn image_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.image_path)
    }
}

/// reqwest-based chat service client
#[derive(Clone, Debug)]
pub struct HttpBackend {
    config: ServiceConfig,
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for `config`
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the HTTP client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// The service configuration in use
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Turn a non-success response into the matching error
    async fn status_error(response: reqwest::Response) -> ChatError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match parse_upstream_error(&body) {
            Some(message) => ChatError::Upstream(message),
            None => ChatError::Status { status, body },
        }
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = self.config.chat_url();
        tracing::debug!(
            url = %url,
            messages = request.messages.len(),
            "Sending chat request"
        );

        let response = self.http_client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let error = Self::status_error(response).await;
            tracing::warn!(url = %url, error = %error, "Chat request rejected");
            return Err(error);
        }

        if response.content_length() == Some(0) {
            tracing::warn!(url = %url, "Chat response has no body");
            return Err(ChatError::EmptyBody);
        }

        Ok(response.bytes_stream().map_err(ChatError::from).boxed())
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImagePayload> {
        let url = self.config.image_url();
        tracing::debug!(url = %url, prompt_len = request.prompt.len(), "Sending image request");

        let response = self
            .http_client
            .post(&url)
            .timeout(self.config.image_timeout)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = Self::status_error(response).await;
            tracing::warn!(url = %url, error = %error, "Image request rejected");
            return Err(error);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
            .to_string();

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ChatError::EmptyBody);
        }

        tracing::debug!(content_type = %content_type, size = bytes.len(), "Image received");
        Ok(ImagePayload::new(content_type, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.chat_url(), "http://127.0.0.1:8787/api/chat");
        assert_eq!(config.image_url(), "http://127.0.0.1:8787/api/image");
        assert_eq!(config.image_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_trailing_slash_in_base_url() {
        let config = ServiceConfig {
            base_url: "https://chat.example.com/".to_string(),
            ..ServiceConfig::default()
        };
        assert_eq!(config.chat_url(), "https://chat.example.com/api/chat");
    }

    #[test]
    fn test_backend_creation() {
        let backend = HttpBackend::new(ServiceConfig::default()).unwrap();
        assert_eq!(backend.name(), "HTTP");
        assert_eq!(backend.config().chat_path, "/api/chat");
    }
}
