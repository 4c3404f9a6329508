//! Worker-Side Framing
//!
//! The service half of the wire contract: which requests the worker accepts,
//! what it forwards to the inference runtime, and how it reports failure.
//! The client never runs this code against a live model. The integration
//! tests mount it behind a mock server as a worker stand-in, configured from
//! the `[worker]` section, so both ends of the framing are checked together.
//!
//! # Routes
//!
//! ```text
//! POST /api/chat    → Chat              (event stream)
//! POST /api/image   → Image             (binary image)
//! *    /api/chat    → MethodNotAllowed  405
//! *    /api/image   → MethodNotAllowed  405
//! anything else     → NotFound          404
//! ```

use serde::{Deserialize, Serialize};

use crate::backend::ChatRequest;
use crate::messages::{Message, MessageRole};
use crate::stream::DATA_PREFIX;

/// Status of the SSE error event
pub const UPSTREAM_ERROR_STATUS: u16 = 500;

/// Message carried by the SSE error event
pub const UPSTREAM_ERROR_MESSAGE: &str = "Failed to process request";

/// Body of a 405 response
pub const METHOD_NOT_ALLOWED_BODY: &str = "Method not allowed";

/// Inference settings of the worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Injected ahead of conversations that carry no system message
    pub system_prompt: String,
    /// Text model identifier
    pub model: String,
    /// Generation limit per turn
    pub max_tokens: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            system_prompt:
                "You are a helpful, friendly assistant. Provide concise and accurate responses."
                    .to_string(),
            model: "@cf/meta/llama-3.1-8b-instruct-fp8".to_string(),
            max_tokens: 1024,
        }
    }
}

/// Where an inbound request goes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerRoute {
    /// Streamed chat turn
    Chat,
    /// Image generation
    Image,
    /// Known path, wrong method
    MethodNotAllowed,
    /// Unknown path
    NotFound,
}

impl WorkerRoute {
    /// Route a request by method and path
    #[must_use]
    pub fn resolve(method: &str, path: &str) -> Self {
        let target = match path {
            "/api/chat" => Self::Chat,
            "/api/image" => Self::Image,
            _ => return Self::NotFound,
        };

        if method == "POST" {
            target
        } else {
            Self::MethodNotAllowed
        }
    }

    /// HTTP status the route answers with
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Self::Chat | Self::Image => 200,
            Self::MethodNotAllowed => 405,
            Self::NotFound => 404,
        }
    }
}

/// Prepend a system message unless the conversation already has one
#[must_use]
pub fn with_system_prompt(mut messages: Vec<Message>, prompt: &str) -> Vec<Message> {
    if !messages.iter().any(|m| m.role == MessageRole::System) {
        messages.insert(0, Message::system(prompt));
    }
    messages
}

/// What the worker hands to the inference runtime for a chat turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Text model identifier
    pub model: String,
    /// Conversation, system message first
    pub messages: Vec<Message>,
    /// Always true: responses are streamed
    pub stream: bool,
    /// Generation limit
    pub max_tokens: u32,
}

impl InferenceRequest {
    /// Build the inference call for an inbound chat request
    #[must_use]
    pub fn from_chat(config: &WorkerConfig, request: ChatRequest) -> Self {
        Self {
            model: config.model.clone(),
            messages: with_system_prompt(request.messages, &config.system_prompt),
            stream: true,
            max_tokens: config.max_tokens,
        }
    }
}

/// The SSE error body the worker sends with [`UPSTREAM_ERROR_STATUS`]
#[must_use]
pub fn upstream_error_event(message: &str) -> String {
    let payload = serde_json::json!({
        "error": message,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    });
    format!("{DATA_PREFIX}{payload}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parse_upstream_error;

    #[test]
    fn test_route_resolution() {
        assert_eq!(WorkerRoute::resolve("POST", "/api/chat"), WorkerRoute::Chat);
        assert_eq!(WorkerRoute::resolve("POST", "/api/image"), WorkerRoute::Image);
        assert_eq!(
            WorkerRoute::resolve("GET", "/api/chat"),
            WorkerRoute::MethodNotAllowed
        );
        assert_eq!(WorkerRoute::resolve("POST", "/api/tts"), WorkerRoute::NotFound);
        assert_eq!(WorkerRoute::resolve("GET", "/"), WorkerRoute::NotFound);

        assert_eq!(WorkerRoute::MethodNotAllowed.status(), 405);
        assert_eq!(WorkerRoute::NotFound.status(), 404);
        assert_eq!(WorkerRoute::Chat.status(), 200);
    }

    #[test]
    fn test_system_prompt_injected_once() {
        let messages = with_system_prompt(vec![Message::user("hi")], "be brief");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[0].content, "be brief");

        let again = with_system_prompt(messages.clone(), "other");
        assert_eq!(again, messages);
    }

    #[test]
    fn test_inference_request_shape() {
        let config = WorkerConfig::default();
        let request = InferenceRequest::from_chat(
            &config,
            ChatRequest::new(vec![Message::user("hello")]),
        );

        assert!(request.stream);
        assert_eq!(request.max_tokens, 1024);
        assert_eq!(request.model, "@cf/meta/llama-3.1-8b-instruct-fp8");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].content, "hello");
    }

    #[test]
    fn test_upstream_error_event_round_trip() {
        let body = upstream_error_event(UPSTREAM_ERROR_MESSAGE);
        assert!(body.starts_with("data: {"));
        assert!(body.ends_with("\n\n"));
        assert_eq!(
            parse_upstream_error(&body).as_deref(),
            Some(UPSTREAM_ERROR_MESSAGE)
        );
    }
}
