//! Stream Ingestor
//!
//! Folds a response byte stream into one target message.
//!
//! ```text
//!            chunk                 lines split
//!   ┌──────────────────┐   ┌──────────────────────┐
//!   │  AwaitingChunk   │──▶│      HaveLines       │──┐ each line in order:
//!   └──────────────────┘   └──────────────────────┘  │  blank     → skip
//!        ▲     │ end of stream          │            │  fragment  → append
//!        │     ▼                        │ sentinel   │  malformed → log, skip
//!        │   Done ◀─────────────────────┘            │
//!        └───────────────────────────────────────────┘
//!   transport error at any point ──▶ Failed
//! ```
//!
//! The ingestor never holds the message itself, only a target that applies
//! id-tagged updates. Fragments are applied one at a time in the order their
//! lines completed.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::decoder::{LineBuffer, Utf8Decoder};
use super::event::{classify_line, LineEvent};
use crate::backend::ByteStream;
use crate::error::{ChatError, Result};
use crate::messages::MessageId;
use crate::transcript::{Transcript, TranscriptUpdate};

/// Content that replaces a message whose stream failed
pub const DEFAULT_ERROR_TEXT: &str = "Error: Failed to get response";

/// Where the ingestor is in its loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestState {
    /// Waiting for the next chunk
    AwaitingChunk,
    /// Processing the lines a chunk completed
    HaveLines,
    /// Sentinel seen, stream closed, or cancelled
    Done,
    /// Transport failed
    Failed,
}

impl IngestState {
    /// Whether no further input will be processed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// How a driven stream ended
#[derive(Debug)]
pub enum IngestOutcome {
    /// The stream finished normally
    Completed {
        /// Whether the terminal sentinel was seen (as opposed to end of stream)
        saw_sentinel: bool,
    },
    /// The caller cancelled; the last applied fragment stands
    Cancelled,
    /// The transport failed; the target content was replaced
    Failed(ChatError),
}

/// Result of driving a stream to its end
#[derive(Debug)]
pub struct IngestReport {
    /// How the stream ended
    pub outcome: IngestOutcome,
    /// Every applied fragment, concatenated in arrival order
    pub text: String,
    /// Number of fragments applied
    pub fragments: usize,
    /// Number of malformed lines and unreadable stream items dropped
    pub malformed: usize,
}

impl IngestReport {
    /// Whether the stream ended in failure
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, IngestOutcome::Failed(_))
    }
}

/// The seam through which the ingestor mutates state
pub trait IngestTarget: Send {
    /// Append one fragment to the target content
    ///
    /// # Errors
    ///
    /// Returns an error if the target no longer exists.
    fn append_fragment(&mut self, fragment: &str) -> Result<()>;

    /// Mark the target as no longer streaming
    ///
    /// # Errors
    ///
    /// Returns an error if the target no longer exists.
    fn finish(&mut self) -> Result<()>;

    /// Replace the target content with `error_text` and stop streaming
    ///
    /// # Errors
    ///
    /// Returns an error if the target no longer exists.
    fn fail(&mut self, error_text: &str) -> Result<()>;
}

/// Target that writes into a transcript message by id
#[derive(Clone, Debug)]
pub struct TranscriptTarget {
    transcript: Transcript,
    id: MessageId,
}

impl TranscriptTarget {
    /// Target message `id` in `transcript`
    #[must_use]
    pub fn new(transcript: Transcript, id: MessageId) -> Self {
        Self { transcript, id }
    }

    /// The target message
    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }
}

impl IngestTarget for TranscriptTarget {
    fn append_fragment(&mut self, fragment: &str) -> Result<()> {
        self.transcript.apply(TranscriptUpdate::AppendFragment {
            id: self.id.clone(),
            fragment: fragment.to_string(),
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.transcript.apply(TranscriptUpdate::Finish {
            id: self.id.clone(),
        })
    }

    fn fail(&mut self, error_text: &str) -> Result<()> {
        self.transcript.apply(TranscriptUpdate::Fail {
            id: self.id.clone(),
            error_text: error_text.to_string(),
        })
    }
}

/// Target that records nothing; only the report carries the text
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedTarget;

impl IngestTarget for DetachedTarget {
    fn append_fragment(&mut self, _fragment: &str) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn fail(&mut self, _error_text: &str) -> Result<()> {
        Ok(())
    }
}

/// Server-sent-event stream consumer for one request
pub struct StreamIngestor<T: IngestTarget> {
    target: T,
    decoder: Utf8Decoder,
    lines: LineBuffer,
    state: IngestState,
    text: String,
    fragments: usize,
    malformed: usize,
    saw_sentinel: bool,
    error_text: String,
}

impl<T: IngestTarget> StreamIngestor<T> {
    /// Create an ingestor that writes into `target`
    pub fn new(target: T) -> Self {
        Self {
            target,
            decoder: Utf8Decoder::new(),
            lines: LineBuffer::new(),
            state: IngestState::AwaitingChunk,
            text: String::new(),
            fragments: 0,
            malformed: 0,
            saw_sentinel: false,
            error_text: DEFAULT_ERROR_TEXT.to_string(),
        }
    }

    /// Use `text` as the content of a failed message
    #[must_use]
    pub fn with_error_text(mut self, text: impl Into<String>) -> Self {
        self.error_text = text.into();
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Fragments applied so far, concatenated
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Process one chunk of bytes
    ///
    /// Every line the chunk completes is handled before returning. Feeding a
    /// terminal ingestor does nothing.
    pub fn feed(&mut self, chunk: &[u8]) -> IngestState {
        if self.state.is_terminal() {
            return self.state;
        }

        let decoded = self.decoder.decode(chunk);
        let complete = self.lines.push(&decoded);
        if complete.is_empty() {
            return self.state;
        }

        self.state = IngestState::HaveLines;
        for line in complete {
            match classify_line(&line) {
                LineEvent::Blank | LineEvent::Ignored => {}
                LineEvent::Done => {
                    self.saw_sentinel = true;
                    self.complete();
                    return self.state;
                }
                LineEvent::Fragment(fragment) => self.apply_fragment(&fragment),
                LineEvent::Malformed(error) => {
                    self.malformed += 1;
                    tracing::warn!(error = %error, "Dropping malformed event line");
                }
            }
        }

        self.state = IngestState::AwaitingChunk;
        self.state
    }

    /// The transport closed without a sentinel
    pub fn end_of_stream(&mut self) -> IngestState {
        if self.state.is_terminal() {
            return self.state;
        }

        let tail = self.decoder.finish();
        self.lines.push(&tail);
        let remainder = self.lines.take_remainder();
        if !remainder.trim().is_empty() {
            tracing::debug!(
                remainder = %remainder,
                "Discarding unterminated line at end of stream"
            );
        }

        self.complete();
        self.state
    }

    /// The transport failed
    pub fn fail(&mut self, error: &ChatError) -> IngestState {
        if self.state.is_terminal() {
            return self.state;
        }

        tracing::warn!(error = %error, "Stream failed");
        let _ = self.lines.take_remainder();
        let result = self.target.fail(&self.error_text);
        log_target_error(result);
        self.state = IngestState::Failed;
        self.state
    }

    /// Stop early, keeping what has been applied
    pub fn cancel(&mut self) -> IngestState {
        if self.state.is_terminal() {
            return self.state;
        }

        tracing::debug!(fragments = self.fragments, "Stream cancelled");
        self.complete();
        self.state
    }

    /// Read `stream` until the sentinel, end of stream, failure or cancellation
    pub async fn drive(mut self, mut stream: ByteStream, cancel: CancellationToken) -> IngestReport {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.cancel();
                    return self.into_report(IngestOutcome::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if self.feed(&chunk).is_terminal() {
                        break;
                    }
                }
                Some(Err(error)) if error.is_fatal_for_stream() => {
                    self.fail(&error);
                    return self.into_report(IngestOutcome::Failed(error));
                }
                Some(Err(error)) => {
                    self.malformed += 1;
                    tracing::warn!(error = %error, "Skipping unreadable stream item");
                }
                None => {
                    self.end_of_stream();
                    break;
                }
            }
        }

        let saw_sentinel = self.saw_sentinel;
        self.into_report(IngestOutcome::Completed { saw_sentinel })
    }

    fn apply_fragment(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.fragments += 1;
        let result = self.target.append_fragment(fragment);
        log_target_error(result);
    }

    fn complete(&mut self) {
        let result = self.target.finish();
        log_target_error(result);
        self.state = IngestState::Done;
        tracing::debug!(
            fragments = self.fragments,
            malformed = self.malformed,
            saw_sentinel = self.saw_sentinel,
            "Stream done"
        );
    }

    fn into_report(self, outcome: IngestOutcome) -> IngestReport {
        IngestReport {
            outcome,
            text: self.text,
            fragments: self.fragments,
            malformed: self.malformed,
        }
    }
}

/// A vanished target is a no-op, not a stream failure
fn log_target_error(result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Transcript update skipped");
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::messages::Message;

    fn chunks(parts: &[&str]) -> ByteStream {
        let items: Vec<Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(items).boxed()
    }

    fn placeholder() -> (Transcript, MessageId) {
        let transcript = Transcript::new();
        let id = transcript.append(Message::placeholder()).unwrap();
        (transcript, id)
    }

    #[test]
    fn test_partial_line_waits_for_separator() {
        let (transcript, id) = placeholder();
        let mut ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        assert_eq!(
            ingestor.feed(br#"data: {"response":"Hel"}"#),
            IngestState::AwaitingChunk
        );
        assert_eq!(transcript.get(&id).unwrap().content, "");

        ingestor.feed(b"\n");
        assert_eq!(transcript.get(&id).unwrap().content, "Hel");
        assert!(transcript.get(&id).unwrap().streaming);
    }

    #[test]
    fn test_first_sentinel_wins() {
        let (transcript, id) = placeholder();
        let mut ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        let state = ingestor.feed(
            b"data: {\"response\":\"A\"}\ndata: [DONE]\ndata: {\"response\":\"B\"}\ndata: [DONE]\n",
        );
        assert_eq!(state, IngestState::Done);

        let msg = transcript.get(&id).unwrap();
        assert_eq!(msg.content, "A");
        assert!(!msg.streaming);

        // Terminal: later input is ignored
        assert_eq!(
            ingestor.feed(b"data: {\"response\":\"C\"}\n"),
            IngestState::Done
        );
        assert_eq!(transcript.get(&id).unwrap().content, "A");
    }

    #[test]
    fn test_fail_replaces_content() {
        let (transcript, id) = placeholder();
        let mut ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        ingestor.feed(b"data: {\"response\":\"Hi\"}\ndata: {\"resp");
        assert_eq!(ingestor.fail(&ChatError::EmptyBody), IngestState::Failed);

        let msg = transcript.get(&id).unwrap();
        assert_eq!(msg.content, DEFAULT_ERROR_TEXT);
        assert!(!msg.streaming);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut ingestor = StreamIngestor::new(DetachedTarget);
        ingestor.feed(b"data: {\"response\":\"A\"}\nnot json\ndata: {\"response\":\"B\"}\n");
        assert_eq!(ingestor.text(), "AB");
        assert_eq!(ingestor.state(), IngestState::AwaitingChunk);
    }

    #[test]
    fn test_result_independent_of_chunk_boundaries() {
        let body = "data: {\"response\":\"caf\u{e9} \"}\r\n\ndata: {\"response\":\"\u{1f3a8}\"}\ndata: [DONE]\n";
        let bytes = body.as_bytes();

        for split in 0..=bytes.len() {
            let (transcript, id) = placeholder();
            let mut ingestor =
                StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));
            ingestor.feed(&bytes[..split]);
            ingestor.feed(&bytes[split..]);

            assert_eq!(ingestor.state(), IngestState::Done, "split at {split}");
            let msg = transcript.get(&id).unwrap();
            assert_eq!(msg.content, "caf\u{e9} \u{1f3a8}", "split at {split}");
            assert!(!msg.streaming);
        }
    }

    #[test]
    fn test_detached_target_still_collects_text() {
        let mut ingestor = StreamIngestor::new(DetachedTarget);
        ingestor.feed(b"{\"response\":\"one \"}\n{\"response\":\"two\"}\n");
        assert_eq!(ingestor.text(), "one two");
    }

    #[tokio::test]
    async fn test_drive_hello_scenario() {
        let (transcript, id) = placeholder();
        let ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        let report = ingestor
            .drive(
                chunks(&[
                    "data: {\"response\":\"Hel\"}\n",
                    "data: {\"resp",
                    "onse\":\"lo\"}\n",
                    "data: [DONE]\n",
                ]),
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            report.outcome,
            IngestOutcome::Completed { saw_sentinel: true }
        ));
        assert_eq!(report.text, "Hello");
        assert_eq!(report.fragments, 2);

        let msg = transcript.get(&id).unwrap();
        assert_eq!(msg.content, "Hello");
        assert!(!msg.streaming);
    }

    #[tokio::test]
    async fn test_drive_end_of_stream_without_sentinel() {
        let (transcript, id) = placeholder();
        let ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        let report = ingestor
            .drive(
                chunks(&["data: {\"response\":\"partial\"}\n", "data: {\"response\":\"cut"]),
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            report.outcome,
            IngestOutcome::Completed { saw_sentinel: false }
        ));
        let msg = transcript.get(&id).unwrap();
        assert_eq!(msg.content, "partial");
        assert!(!msg.streaming);
    }

    #[tokio::test]
    async fn test_drive_cancelled_keeps_content() {
        let (transcript, id) = placeholder();
        let ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = ingestor
            .drive(chunks(&["data: {\"response\":\"never\"}\n"]), cancel)
            .await;

        assert!(matches!(report.outcome, IngestOutcome::Cancelled));
        let msg = transcript.get(&id).unwrap();
        assert_eq!(msg.content, "");
        assert!(!msg.streaming);
    }

    #[tokio::test]
    async fn test_vanished_target_does_not_abort() {
        let (transcript, id) = placeholder();
        transcript.clear();
        let ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id));

        let report = ingestor
            .drive(
                chunks(&["data: {\"response\":\"x\"}\ndata: [DONE]\n"]),
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(report.outcome, IngestOutcome::Completed { .. }));
        assert_eq!(report.text, "x");
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn test_drive_transport_failure_after_fragment() {
        let (transcript, id) = placeholder();
        let ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"response\":\"Hi\"}\ndata: {\"re")),
            Err(ChatError::EmptyBody),
            Ok(Bytes::from_static(b"sponse\":\"late\"}\n")),
        ];
        let report = ingestor
            .drive(stream::iter(items).boxed(), CancellationToken::new())
            .await;

        assert!(matches!(
            report.outcome,
            IngestOutcome::Failed(ChatError::EmptyBody)
        ));
        assert_eq!(report.text, "Hi");
        let msg = transcript.get(&id).unwrap();
        assert_eq!(msg.content, DEFAULT_ERROR_TEXT);
        assert!(!msg.streaming);
    }

    #[tokio::test]
    async fn test_drive_skips_recoverable_stream_item() {
        let (transcript, id) = placeholder();
        let ingestor = StreamIngestor::new(TranscriptTarget::new(transcript.clone(), id.clone()));

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"response\":\"A\"}\n")),
            Err(ChatError::MalformedEvent {
                line: "{".to_string(),
                source,
            }),
            Ok(Bytes::from_static(b"data: {\"response\":\"B\"}\ndata: [DONE]\n")),
        ];
        let report = ingestor
            .drive(stream::iter(items).boxed(), CancellationToken::new())
            .await;

        assert!(matches!(
            report.outcome,
            IngestOutcome::Completed { saw_sentinel: true }
        ));
        assert_eq!(report.malformed, 1);
        assert_eq!(transcript.get(&id).unwrap().content, "AB");
    }
}
