//! Stream Ingestion
//!
//! Turns the chat service's chunked response body into updates of a single
//! transcript message.
//!
//! # Architecture
//!
//! ```text
//! bytes ──▶ Utf8Decoder ──▶ LineBuffer ──▶ classify_line ──▶ IngestTarget
//!           (held-back       (held-back      (blank, sentinel,   (transcript
//!            partial chars)   partial line)   fragment, junk)     or detached)
//! ```
//!
//! The decode buffer belongs to exactly one [`StreamIngestor`], so two
//! requests in flight never share partial lines.

pub mod decoder;
pub mod event;
pub mod ingestor;

pub use decoder::{LineBuffer, Utf8Decoder, LINE_SEPARATOR};
pub use event::{classify_line, parse_upstream_error, LineEvent, DATA_PREFIX, DONE_SENTINEL};
pub use ingestor::{
    DetachedTarget, IngestOutcome, IngestReport, IngestState, IngestTarget, StreamIngestor,
    TranscriptTarget, DEFAULT_ERROR_TEXT,
};
