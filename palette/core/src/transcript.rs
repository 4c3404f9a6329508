//! Transcript Store
//!
//! The ordered log of conversation messages. Insertion order is chronological
//! and is the history sent back to the service on the next turn.
//!
//! # Thread Safety
//!
//! `Transcript` is a cheap-to-clone handle around `Arc<RwLock<Vec<Message>>>`.
//! Every mutation takes the write lock for the whole read-modify-replace of a
//! single message, so a reader taking a [`Transcript::snapshot`] sees each
//! message either before or after an update, never halfway through.
//!
//! Nothing outside the store ever holds a `&mut Message`. Writers name the
//! message they want to change by id, either with [`Transcript::update_by_id`]
//! or by sending an id-tagged [`TranscriptUpdate`] through
//! [`Transcript::apply`].
//!
//! # Change Notification
//!
//! Render passes call [`Transcript::subscribe`] and re-read the messages named
//! by each [`TranscriptEvent`]. Events are published while the write lock is
//! still held, so their order is the mutation order.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::{ChatError, Result};
use crate::messages::{Message, MessageId};

/// Capacity of the change-notification channel
const EVENT_CAPACITY: usize = 256;

/// Notification that the transcript changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// A message was added at the end
    Appended {
        /// The new message
        id: MessageId,
    },
    /// A message was replaced in place
    Updated {
        /// The changed message
        id: MessageId,
    },
    /// All messages were removed
    Cleared,
}

/// An id-tagged mutation request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptUpdate {
    /// Append a streamed fragment to the message content
    AppendFragment {
        /// Target message
        id: MessageId,
        /// Text to append
        fragment: String,
    },
    /// Mark the message as no longer streaming
    Finish {
        /// Target message
        id: MessageId,
    },
    /// Replace the content with an error indicator and stop streaming
    Fail {
        /// Target message
        id: MessageId,
        /// The indicator text
        error_text: String,
    },
}

impl TranscriptUpdate {
    /// The message this update targets
    #[must_use]
    pub fn id(&self) -> &MessageId {
        match self {
            Self::AppendFragment { id, .. } | Self::Finish { id } | Self::Fail { id, .. } => id,
        }
    }
}

/// Shared, ordered conversation log
#[derive(Clone)]
pub struct Transcript {
    messages: Arc<RwLock<Vec<Message>>>,
    events: broadcast::Sender<TranscriptEvent>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            events,
        }
    }

    /// Create a transcript holding existing history
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::DuplicateId`] if two messages share an id.
    pub fn from_messages(messages: Vec<Message>) -> Result<Self> {
        let transcript = Self::new();
        for message in messages {
            transcript.append(message)?;
        }
        Ok(transcript)
    }

    /// Add a message at the end
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::DuplicateId`] if the id is already present.
    pub fn append(&self, message: Message) -> Result<MessageId> {
        let id = message.id.clone();
        let mut messages = self.messages.write();
        if messages.iter().any(|m| m.id == id) {
            return Err(ChatError::DuplicateId(id));
        }
        messages.push(message);
        tracing::trace!(message_id = %id, index = messages.len() - 1, "Message appended");
        let _ = self.events.send(TranscriptEvent::Appended { id: id.clone() });
        Ok(id)
    }

    /// Replace the message with `id` by `mutator(current)`
    ///
    /// The replacement keeps the message's position. It must keep the same
    /// `id`, `created_at` and `type`, and may not turn `streaming` back on.
    ///
    /// `mutator` runs under the write lock and must not call back into this
    /// transcript (`get`, `snapshot`, `len`, ...): the lock is not re-entrant
    /// and the call deadlocks.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if no message has this id, or
    /// [`ChatError::InvalidUpdate`] if the replacement breaks an invariant.
    /// In both cases the transcript is unchanged.
    pub fn update_by_id<F>(&self, id: &MessageId, mutator: F) -> Result<()>
    where
        F: FnOnce(&Message) -> Message,
    {
        let mut messages = self.messages.write();
        let slot = messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;

        let next = mutator(slot);
        if let Some(reason) = invariant_violation(slot, &next) {
            return Err(ChatError::InvalidUpdate {
                id: id.clone(),
                reason,
            });
        }

        *slot = next;
        let _ = self.events.send(TranscriptEvent::Updated { id: id.clone() });
        Ok(())
    }

    /// Apply an id-tagged update
    ///
    /// Updates are applied in place; a fragment costs its own length, not the
    /// length of the message it grows.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if no message has this id.
    pub fn apply(&self, update: TranscriptUpdate) -> Result<()> {
        match update {
            TranscriptUpdate::AppendFragment { id, fragment } => {
                self.modify(&id, |m| m.push_fragment(&fragment))
            }
            TranscriptUpdate::Finish { id } => self.modify(&id, Message::finish),
            TranscriptUpdate::Fail { id, error_text } => {
                self.modify(&id, |m| m.fail(&error_text))
            }
        }
    }

    /// In-place update for mutations that cannot break an invariant
    fn modify<F>(&self, id: &MessageId, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut Message),
    {
        let mut messages = self.messages.write();
        let slot = messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;

        mutator(slot);
        let _ = self.events.send(TranscriptEvent::Updated { id: id.clone() });
        Ok(())
    }

    /// Immutable copy of the full ordered sequence
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    /// Copy of a single message
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.messages.read().iter().find(|m| &m.id == id).cloned()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether the transcript has no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Ids of messages that are still streaming
    #[must_use]
    pub fn streaming_ids(&self) -> Vec<MessageId> {
        self.messages
            .read()
            .iter()
            .filter(|m| m.streaming)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Remove every message
    pub fn clear(&self) {
        let mut messages = self.messages.write();
        messages.clear();
        let _ = self.events.send(TranscriptEvent::Cleared);
    }

    /// Receive change notifications from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.events.subscribe()
    }

    /// Serialize a snapshot in the wire shape
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which only happens for non-UTF-8 content.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.messages.read())
    }

    /// Rebuild a transcript from [`Transcript::to_json`] output
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MalformedEvent`] for invalid JSON and
    /// [`ChatError::DuplicateId`] for repeated ids.
    pub fn from_json(json: &str) -> Result<Self> {
        let messages: Vec<Message> =
            serde_json::from_str(json).map_err(|source| ChatError::MalformedEvent {
                line: json.chars().take(80).collect(),
                source,
            })?;
        Self::from_messages(messages)
    }
}

/// Check that `next` is a legal successor of `current`
fn invariant_violation(current: &Message, next: &Message) -> Option<&'static str> {
    if next.id != current.id {
        Some("id changed")
    } else if next.created_at != current.created_at {
        Some("created_at changed")
    } else if next.content_type != current.content_type {
        Some("type changed")
    } else if next.streaming && !current.streaming {
        Some("streaming restarted")
    } else {
        None
    }
}
