//! Live transcript rendering
//!
//! Prints assistant replies as they stream. The renderer never holds a
//! message; it receives change notifications, re-reads the named message by
//! id and prints whatever is new since the last time it looked.

use std::collections::HashMap;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;

use palette_core::{Message, MessageId, MessageRole, Transcript, TranscriptEvent};

/// What the renderer was told
#[derive(Debug)]
pub enum Pending {
    /// A transcript change
    Event(TranscriptEvent),
    /// Notifications were dropped; re-read everything in flight
    Lagged(u64),
}

#[derive(Debug, Default)]
struct Progress {
    shown: String,
    closed: bool,
}

/// Incremental transcript printer
pub struct Renderer<W> {
    transcript: Transcript,
    events: Receiver<TranscriptEvent>,
    out: W,
    progress: HashMap<MessageId, Progress>,
}

impl<W: AsyncWrite + Unpin> Renderer<W> {
    /// Start following `transcript` from now on
    pub fn new(transcript: Transcript, out: W) -> Self {
        let events = transcript.subscribe();
        Self {
            transcript,
            events,
            out,
            progress: HashMap::new(),
        }
    }

    /// Wait for the next notification
    ///
    /// Cancel-safe: nothing is lost if the future is dropped before it
    /// completes. Returns `None` once the transcript is gone.
    pub async fn recv(&mut self) -> Option<Pending> {
        match self.events.recv().await {
            Ok(event) => Some(Pending::Event(event)),
            Err(RecvError::Lagged(skipped)) => Some(Pending::Lagged(skipped)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Print what a notification changed
    pub async fn render(&mut self, pending: Pending) -> io::Result<()> {
        match pending {
            Pending::Event(TranscriptEvent::Appended { id } | TranscriptEvent::Updated { id }) => {
                self.render_message(&id).await
            }
            Pending::Event(TranscriptEvent::Cleared) => {
                self.progress.clear();
                Ok(())
            }
            Pending::Lagged(skipped) => {
                tracing::debug!(skipped, "Render fell behind, resyncing");
                self.resync().await
            }
        }
    }

    /// Render every notification already queued
    pub async fn drain(&mut self) -> io::Result<()> {
        loop {
            let pending = match self.events.try_recv() {
                Ok(event) => Pending::Event(event),
                Err(TryRecvError::Lagged(skipped)) => Pending::Lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
            };
            self.render(pending).await?;
        }
    }

    /// Write text that is not part of the transcript
    pub async fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }

    /// The underlying writer
    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    async fn resync(&mut self) -> io::Result<()> {
        let ids: Vec<MessageId> = self
            .transcript
            .snapshot()
            .into_iter()
            .filter(|m| m.streaming || self.progress.get(&m.id).is_some_and(|p| !p.closed))
            .map(|m| m.id)
            .collect();
        for id in ids {
            self.render_message(&id).await?;
        }
        Ok(())
    }

    async fn render_message(&mut self, id: &MessageId) -> io::Result<()> {
        let Some(message) = self.transcript.get(id) else {
            return Ok(());
        };
        if message.role != MessageRole::Assistant {
            return Ok(());
        }

        let text = if message.is_text() {
            self.text_delta(&message)
        } else if self.progress.contains_key(id) {
            None
        } else {
            self.progress.insert(
                id.clone(),
                Progress {
                    shown: String::new(),
                    closed: true,
                },
            );
            Some(format!("[image {id}]\n"))
        };

        match text {
            Some(text) if !text.is_empty() => self.write_str(&text).await,
            _ => Ok(()),
        }
    }

    fn text_delta(&mut self, message: &Message) -> Option<String> {
        let progress = self.progress.entry(message.id.clone()).or_default();
        if progress.closed {
            return None;
        }

        let mut text = String::new();
        match message.content.strip_prefix(progress.shown.as_str()) {
            Some(delta) => text.push_str(delta),
            None => {
                // replaced by an error indicator
                if !progress.shown.is_empty() {
                    text.push('\n');
                }
                text.push_str(&message.content);
            }
        }
        progress.shown.clone_from(&message.content);

        if !message.streaming {
            text.push('\n');
            progress.closed = true;
        }
        Some(text)
    }
}
