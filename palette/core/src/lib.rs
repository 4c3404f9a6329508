//! Palette Core - Headless Streaming Chat
//!
//! This crate provides the chat logic of palette, independent of any front
//! end: a transcript of messages, an ingestor that folds a server-sent-event
//! response stream into one of those messages, and the orchestration that
//! sequences a chat turn and the optional image workflow after it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Front ends (CLI, tests)                  │
//! │        subscribe(TranscriptEvent)        CancelHandle         │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │                              │
//! ┌───────────────┼──────────────────────────────┼───────────────┐
//! │               │        PALETTE CORE          │               │
//! │  ┌────────────┴─────┐   ┌────────────────────┴────────────┐  │
//! │  │    Transcript    │◀──│           ChatClient            │  │
//! │  │ (update by id)   │   │  send_message / run_workflow    │  │
//! │  └────────▲─────────┘   └───────┬──────────────────┬──────┘  │
//! │           │                     │ ByteStream       │         │
//! │  ┌────────┴─────────┐   ┌───────▼────────┐  ┌──────▼──────┐  │
//! │  │  StreamIngestor  │◀──│  ChatBackend   │  │   Image     │  │
//! │  │ decode/split/    │   │ (HttpBackend)  │  │  payload    │  │
//! │  │ classify/apply   │   └────────────────┘  └─────────────┘  │
//! │  └──────────────────┘                                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Transcript`]: Ordered, shared message log, mutated only by id
//! - [`StreamIngestor`]: Per-request state machine over the response bytes
//! - [`ChatClient`]: Sequences a turn and the image workflow
//! - [`HttpBackend`]: reqwest client for the chat service
//!
//! # Quick Start
//!
//! ```ignore
//! use palette_core::{load_config, ChatClient, HttpBackend};
//!
//! let config = load_config()?;
//! let backend = HttpBackend::new(config.service.clone())?;
//! let client = ChatClient::new(backend, config.chat.clone());
//!
//! let mut events = client.transcript().subscribe();
//! let outcome = client.run_workflow("Describe a lighthouse at night").await?;
//! ```
//!
//! # Module Overview
//!
//! - [`messages`]: Message data model
//! - [`transcript`]: Transcript store and change notification
//! - [`stream`]: Stream ingestion (decoding, line classification, state machine)
//! - [`backend`]: Chat service backends
//! - [`chat`]: Request orchestration
//! - [`worker`]: Service-side route and framing definitions
//! - [`config`]: TOML and environment configuration
//! - [`error`]: Error type

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod messages;
pub mod stream;
pub mod transcript;
pub mod worker;

// Re-exports for convenience
pub use backend::{
    ByteStream, ChatBackend, ChatRequest, HttpBackend, ImagePayload, ImageRequest, ServiceConfig,
};
pub use chat::{
    render_image_prompt, CancelHandle, ChatClient, ChatConfig, ClientState, Reply,
    WorkflowOutcome,
};
pub use error::{ChatError, Result};
pub use messages::{ContentType, Message, MessageId, MessageRole};
pub use stream::{
    DetachedTarget, IngestOutcome, IngestReport, IngestState, IngestTarget, StreamIngestor,
    TranscriptTarget,
};
pub use transcript::{Transcript, TranscriptEvent, TranscriptUpdate};
pub use worker::{upstream_error_event, InferenceRequest, WorkerConfig, WorkerRoute};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, PaletteConfig, PaletteToml,
};
