//! Chat Service Backends
//!
//! Abstracted access to the remote chat service through a common trait.
//!
//! # Available Backends
//!
//! - **HTTP**: the worker's `/api/chat` and `/api/image` endpoints (default)
//!
//! # Usage
//!
//! ```ignore
//! use palette_core::backend::{ChatBackend, ChatRequest, HttpBackend, ServiceConfig};
//!
//! let backend = HttpBackend::new(ServiceConfig::default())?;
//! let body = backend.stream_chat(&ChatRequest::new(history)).await?;
//! ```

mod http;
mod traits;

pub use http::{HttpBackend, ServiceConfig, DEFAULT_BASE_URL};
pub use traits::{
    ByteStream, ChatBackend, ChatRequest, ImagePayload, ImageRequest, DEFAULT_IMAGE_CONTENT_TYPE,
};
