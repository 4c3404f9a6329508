//! TOML Configuration File Support
//!
//! Centralized configuration loading for the chat client, from a TOML file at
//! `~/.config/palette/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/palette/config.toml` (typically `~/.config/palette/config.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [service]
//! base_url = "http://127.0.0.1:8787"
//! chat_path = "/api/chat"
//! image_path = "/api/image"
//! connect_timeout_ms = 10000
//! image_timeout_secs = 120
//!
//! [chat]
//! error_message = "Error: Failed to get response"
//! generate_images = true
//! image_prompt_template = "Describe this as a painting:\n\n{response}"
//!
//! [worker]
//! system_prompt = "You are a helpful, friendly assistant."
//! model = "@cf/meta/llama-3.1-8b-instruct-fp8"
//! max_tokens = 1024
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::ServiceConfig;
use crate::chat::ChatConfig;
use crate::worker::WorkerConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Service section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceToml {
    /// Scheme, host and port of the chat service
    pub base_url: Option<String>,

    /// Path of the chat endpoint
    pub chat_path: Option<String>,

    /// Path of the image endpoint
    pub image_path: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Whole-request timeout for image generation in seconds
    pub image_timeout_secs: Option<u64>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Content shown in place of a failed reply
    pub error_message: Option<String>,

    /// Whether the workflow follows a reply with an image
    pub generate_images: Option<bool>,

    /// Instruction that turns a reply into an image prompt
    pub image_prompt_template: Option<String>,
}

/// Worker section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerToml {
    /// System prompt injected by the worker
    pub system_prompt: Option<String>,

    /// Text model identifier
    pub model: Option<String>,

    /// Generation limit per turn
    pub max_tokens: Option<u32>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteToml {
    /// Service configuration section
    pub service: ServiceToml,

    /// Chat configuration section
    pub chat: ChatToml,

    /// Worker configuration section
    pub worker: WorkerToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration from all sources
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct PaletteConfig {
    /// Chat service location and timeouts
    pub service: ServiceConfig,

    /// Orchestration settings
    pub chat: ChatConfig,

    /// Worker-side inference settings
    pub worker: WorkerConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            chat: ChatConfig::default(),
            worker: WorkerConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PaletteConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = &self.service.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "service.base_url must start with http:// or https://, got {base_url:?}"
            )));
        }

        for (name, path) in [
            ("service.chat_path", &self.service.chat_path),
            ("service.image_path", &self.service.image_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must start with '/', got {path:?}"
                )));
            }
        }

        if self.chat.error_message.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "chat.error_message must not be empty".to_string(),
            ));
        }

        if self.worker.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "worker.max_tokens must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/palette/config.toml` or
/// `~/.config/palette/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("palette").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or a
/// resolved value fails validation. A missing config file is not an error.
pub fn load_config() -> Result<PaletteConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// Reads the file synchronously; call it before the async runtime starts.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PaletteConfig, ConfigError> {
    let mut config = PaletteConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: PaletteToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PaletteConfig, toml: &PaletteToml) {
    // Service
    if let Some(ref url) = toml.service.base_url {
        config.service.base_url = url.clone();
    }
    if let Some(ref path) = toml.service.chat_path {
        config.service.chat_path = path.clone();
    }
    if let Some(ref path) = toml.service.image_path {
        config.service.image_path = path.clone();
    }
    if let Some(ms) = toml.service.connect_timeout_ms {
        config.service.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.service.image_timeout_secs {
        config.service.image_timeout = Duration::from_secs(secs);
    }

    // Chat
    if let Some(ref message) = toml.chat.error_message {
        config.chat.error_message = message.clone();
    }
    if let Some(enabled) = toml.chat.generate_images {
        config.chat.generate_images = enabled;
    }
    if let Some(ref template) = toml.chat.image_prompt_template {
        config.chat.image_prompt_template = template.clone();
    }

    // Worker
    if let Some(ref prompt) = toml.worker.system_prompt {
        config.worker.system_prompt = prompt.clone();
    }
    if let Some(ref model) = toml.worker.model {
        config.worker.model = model.clone();
    }
    if let Some(max_tokens) = toml.worker.max_tokens {
        config.worker.max_tokens = max_tokens;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut PaletteConfig) {
    apply_env_with(config, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`
fn apply_env_with<F>(config: &mut PaletteConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("PALETTE_BASE_URL") {
        config.service.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parse_env::<u64>(&lookup, "PALETTE_CONNECT_TIMEOUT_MS") {
        config.service.connect_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parse_env::<u64>(&lookup, "PALETTE_IMAGE_TIMEOUT_SECS") {
        config.service.image_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }

    if let Some(message) = lookup("PALETTE_ERROR_MESSAGE") {
        config.chat.error_message = message;
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = lookup("PALETTE_GENERATE_IMAGES") {
        config.chat.generate_images = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }

    if let Some(prompt) = lookup("PALETTE_SYSTEM_PROMPT") {
        config.worker.system_prompt = prompt;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = lookup("PALETTE_MODEL") {
        config.worker.model = model;
        config.source = ConfigSource::Env;
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides,
/// then call [`PaletteConfig::validate`] again.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Service base URL override
    pub base_url: Option<String>,

    /// Image generation toggle override
    pub generate_images: Option<bool>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set image generation override
    #[must_use]
    pub fn with_generate_images(mut self, enabled: bool) -> Self {
        self.generate_images = Some(enabled);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none() && self.generate_images.is_none() && self.connect_timeout_ms.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut PaletteConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.service.base_url = url.clone();
        }

        if let Some(enabled) = self.generate_images {
            config.chat.generate_images = enabled;
        }

        if let Some(ms) = self.connect_timeout_ms {
            config.service.connect_timeout = Duration::from_millis(ms);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
