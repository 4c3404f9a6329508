//! Chat Client - Request Orchestration
//!
//! Sequences one conversational turn, and optionally the image workflow that
//! follows it:
//!
//! ```text
//! send_message(input)
//!   1. append user message
//!   2. snapshot history (user message included)
//!   3. append streaming placeholder
//!   4. POST history ──▶ StreamIngestor ──▶ placeholder (by id)
//!
//! run_workflow(input)
//!   send_message ──▶ send_detached(rewrite prompt) ──▶ generate_image
//!        │                  (nothing appended)              │
//!        ▼                                                  ▼
//!   assistant text                                    image message
//! ```
//!
//! # Design Philosophy
//!
//! The client owns no rendering. Front ends watch the [`Transcript`] for
//! message changes and [`ChatClient::subscribe_state`] for what the client
//! is doing, and stop a running stream through a [`CancelHandle`].
//!
//! A turn never leaves its placeholder streaming: the ingestor finishes or
//! fails it, and if the turn's future is dropped midway the placeholder is
//! finished on the way out.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{ChatBackend, ChatRequest, ImageRequest};
use crate::error::{ChatError, Result};
use crate::messages::{Message, MessageId};
use crate::stream::{
    DetachedTarget, IngestOutcome, IngestReport, StreamIngestor, TranscriptTarget,
    DEFAULT_ERROR_TEXT,
};
use crate::transcript::{Transcript, TranscriptUpdate};

/// Marker replaced by the assistant reply in the image prompt template
pub const RESPONSE_PLACEHOLDER: &str = "{response}";

/// Instruction that turns a reply into an image prompt
pub const DEFAULT_IMAGE_PROMPT_TEMPLATE: &str = "Rewrite the following Input into a detailed, \
vivid image prompt for an AI art generator. Focus on key visual elements, mood, colors, \
lighting, and style. Exclude abstract concepts unless visually representable. Keep concise but \
rich in detail.\n\n{response}";

/// Chat client configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Content that replaces a failed reply
    pub error_message: String,
    /// Whether [`ChatClient::run_workflow`] goes on to generate an image
    pub generate_images: bool,
    /// Rewrite instruction; see [`render_image_prompt`]
    pub image_prompt_template: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            error_message: DEFAULT_ERROR_TEXT.to_string(),
            generate_images: true,
            image_prompt_template: DEFAULT_IMAGE_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// What the client is doing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Request sent, no response yet
    Thinking,
    /// Reply fragments arriving
    Streaming,
    /// Turning the reply into an image prompt
    Rewriting,
    /// Waiting for the image
    Painting,
}

impl ClientState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Thinking => "Thinking...",
            Self::Streaming => "Responding...",
            Self::Rewriting => "Imagining...",
            Self::Painting => "Painting...",
        }
    }

    /// Whether a request is in flight
    #[must_use]
    pub fn is_busy(self) -> bool {
        self != Self::Idle
    }
}

/// Cancels whatever request the client is currently running
///
/// Every operation gets a fresh token before the client reports itself busy,
/// so a cancel only ever stops the operation that was running when it was
/// issued. The stages of a workflow share one token.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    /// Cancel the running request, if any
    pub fn cancel(&self) {
        self.current.lock().cancel();
    }

    /// Whether the most recent request was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.current.lock().is_cancelled()
    }

    /// Install and return the token of a new request
    fn fresh(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock() = token.clone();
        token
    }
}

/// Result of one streamed request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// The assistant message that was streamed into, `None` when detached
    pub message_id: Option<MessageId>,
    /// Every fragment received, concatenated
    pub text: String,
    /// Whether the stream was cut short by a cancel
    pub cancelled: bool,
}

/// Result of [`ChatClient::run_workflow`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowOutcome {
    /// The visible reply
    pub reply: Reply,
    /// The rewritten image prompt, if the workflow got that far
    pub image_prompt: Option<String>,
    /// The appended image message, if one was generated
    pub image_id: Option<MessageId>,
}

/// Fill the image prompt template with an assistant reply
///
/// The reply replaces every `{response}` marker. A template without the
/// marker gets the reply appended after a blank line.
#[must_use]
pub fn render_image_prompt(template: &str, response: &str) -> String {
    if template.contains(RESPONSE_PLACEHOLDER) {
        template.replace(RESPONSE_PLACEHOLDER, response)
    } else {
        format!("{template}\n\n{response}")
    }
}

/// Streaming chat client
pub struct ChatClient<B: ChatBackend> {
    config: ChatConfig,
    backend: Arc<B>,
    transcript: Transcript,
    cancel: CancelHandle,
    state: watch::Sender<ClientState>,
}

impl<B: ChatBackend> ChatClient<B> {
    /// Create a client with an empty transcript
    pub fn new(backend: B, config: ChatConfig) -> Self {
        Self::with_transcript(backend, config, Transcript::new())
    }

    /// Create a client that continues an existing transcript
    pub fn with_transcript(backend: B, config: ChatConfig, transcript: Transcript) -> Self {
        let (state, _) = watch::channel(ClientState::Idle);
        Self {
            config,
            backend: Arc::new(backend),
            transcript,
            cancel: CancelHandle::default(),
            state,
        }
    }

    /// The conversation
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The configuration in use
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The backend in use
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Handle that cancels the running request from another task
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Send user input and stream the reply into the transcript
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyInput`] for blank input (nothing is
    /// appended). Transport failures are returned after the placeholder has
    /// been replaced with the configured error message.
    pub async fn send_message(&self, input: &str) -> Result<Reply> {
        let token = self.cancel.fresh();
        let _idle = IdleOnDrop(&self.state);
        self.stream_turn(input, &token).await
    }

    /// Send a prompt whose exchange is not recorded
    ///
    /// The service sees the transcript plus `prompt` as a final user message;
    /// the transcript is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyInput`] for a blank prompt, or the transport
    /// error that ended the stream.
    pub async fn send_detached(&self, prompt: &str) -> Result<Reply> {
        let token = self.cancel.fresh();
        let _idle = IdleOnDrop(&self.state);
        self.stream_detached(prompt, &token).await
    }

    /// Generate an image and append it as an image message
    ///
    /// Returns `Ok(None)` if the request was cancelled. A failure leaves the
    /// transcript untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyInput`] for a blank prompt, or the transport
    /// error of the image request.
    pub async fn generate_image(&self, prompt: &str) -> Result<Option<MessageId>> {
        let token = self.cancel.fresh();
        let _idle = IdleOnDrop(&self.state);
        self.paint(prompt, &token).await
    }

    /// Send input, then turn the reply into an image
    ///
    /// The image stages are skipped when the reply is empty or cancelled, or
    /// when image generation is disabled. All stages share one cancellation
    /// token, so a cancel issued between stages stops the ones still to come.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub async fn run_workflow(&self, input: &str) -> Result<WorkflowOutcome> {
        let token = self.cancel.fresh();
        let _idle = IdleOnDrop(&self.state);

        let reply = self.stream_turn(input, &token).await?;
        let mut outcome = WorkflowOutcome {
            reply,
            image_prompt: None,
            image_id: None,
        };

        if !self.config.generate_images
            || outcome.reply.cancelled
            || outcome.reply.text.trim().is_empty()
        {
            tracing::debug!(
                generate_images = self.config.generate_images,
                cancelled = outcome.reply.cancelled,
                "Skipping image stages"
            );
            return Ok(outcome);
        }

        let instruction = render_image_prompt(&self.config.image_prompt_template, &outcome.reply.text);
        let rewritten = self.stream_detached(&instruction, &token).await?;
        if rewritten.cancelled || rewritten.text.trim().is_empty() {
            return Ok(outcome);
        }

        outcome.image_id = self.paint(&rewritten.text, &token).await?;
        outcome.image_prompt = Some(rewritten.text);
        Ok(outcome)
    }

    async fn stream_turn(&self, input: &str, token: &CancellationToken) -> Result<Reply> {
        if input.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        self.state.send_replace(ClientState::Thinking);
        self.transcript.append(Message::user(input))?;
        let history = self.transcript.snapshot();

        let placeholder = self.transcript.append(Message::placeholder())?;
        let _finish = FinishOnDrop {
            transcript: &self.transcript,
            id: placeholder.clone(),
        };
        tracing::debug!(
            message_id = %placeholder,
            history = history.len(),
            backend = self.backend.name(),
            "Starting turn"
        );

        let request = ChatRequest::new(history);
        let body = tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(message_id = %placeholder, "Turn cancelled before response");
                return Ok(Reply {
                    message_id: Some(placeholder),
                    text: String::new(),
                    cancelled: true,
                });
            }
            body = self.backend.stream_chat(&request) => body,
        };

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(message_id = %placeholder, error = %e, "Chat request failed");
                self.fail_placeholder(&placeholder);
                return Err(e);
            }
        };

        self.state.send_replace(ClientState::Streaming);
        let target = TranscriptTarget::new(self.transcript.clone(), placeholder.clone());
        let report = StreamIngestor::new(target)
            .with_error_text(self.config.error_message.clone())
            .drive(body, token.clone())
            .await;

        tracing::info!(
            message_id = %placeholder,
            fragments = report.fragments,
            malformed = report.malformed,
            "Turn finished"
        );
        into_reply(report, Some(placeholder))
    }

    async fn stream_detached(&self, prompt: &str, token: &CancellationToken) -> Result<Reply> {
        if prompt.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        self.state.send_replace(ClientState::Rewriting);
        let mut history = self.transcript.snapshot();
        history.push(Message::user(prompt));

        let request = ChatRequest::new(history);
        let body = tokio::select! {
            biased;
            () = token.cancelled() => {
                return Ok(Reply { message_id: None, text: String::new(), cancelled: true });
            }
            body = self.backend.stream_chat(&request) => body?,
        };

        let report = StreamIngestor::new(DetachedTarget)
            .with_error_text(self.config.error_message.clone())
            .drive(body, token.clone())
            .await;

        tracing::debug!(fragments = report.fragments, "Detached request finished");
        into_reply(report, None)
    }

    async fn paint(&self, prompt: &str, token: &CancellationToken) -> Result<Option<MessageId>> {
        if prompt.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        self.state.send_replace(ClientState::Painting);
        let request = ImageRequest::new(prompt);
        let payload = tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!("Image request cancelled");
                return Ok(None);
            }
            payload = self.backend.generate_image(&request) => payload?,
        };

        let id = self.transcript.append(Message::image(payload.to_data_url()))?;
        tracing::info!(
            message_id = %id,
            content_type = %payload.content_type,
            size = payload.bytes.len(),
            "Image appended"
        );
        Ok(Some(id))
    }

    fn fail_placeholder(&self, id: &MessageId) {
        let update = TranscriptUpdate::Fail {
            id: id.clone(),
            error_text: self.config.error_message.clone(),
        };
        if let Err(e) = self.transcript.apply(update) {
            tracing::warn!(message_id = %id, error = %e, "Could not mark reply as failed");
        }
    }
}

fn into_reply(report: IngestReport, message_id: Option<MessageId>) -> Result<Reply> {
    let cancelled = match report.outcome {
        IngestOutcome::Failed(e) => return Err(e),
        IngestOutcome::Cancelled => true,
        IngestOutcome::Completed { .. } => false,
    };
    Ok(Reply {
        message_id,
        text: report.text,
        cancelled,
    })
}

/// Returns the client to idle however the operation ends
struct IdleOnDrop<'a>(&'a watch::Sender<ClientState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ClientState::Idle);
    }
}

/// Stops a placeholder from streaming forever if its turn is abandoned
struct FinishOnDrop<'a> {
    transcript: &'a Transcript,
    id: MessageId,
}

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        let still_streaming = self.transcript.get(&self.id).is_some_and(|m| m.streaming);
        if still_streaming {
            let _ = self.transcript.apply(TranscriptUpdate::Finish {
                id: self.id.clone(),
            });
        }
    }
}
