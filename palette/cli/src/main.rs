//! Palette - Streaming Chat in the Terminal
//!
//! Sends prompts to the chat service, prints replies as they stream, and
//! optionally turns each reply into a generated image.
//!
//! # Usage
//!
//! ```bash
//! # One-shot: reply, rewrite, image
//! palette "Describe a lighthouse at night"
//!
//! # Interactive session (commands: /quit, /clear, /save <path>)
//! palette
//!
//! # Custom service, keep images and the transcript
//! palette --base-url https://chat.example.com --image-dir ./art --transcript chat.json
//!
//! # Verbose logging
//! RUST_LOG=debug palette
//! ```
//!
//! # Signals
//!
//! - `SIGINT` while a reply streams: stop the reply, keep what arrived
//! - `SIGINT` while idle: exit

mod export;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Stdout};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use palette_core::{
    default_config_path, load_config_from_path, CancelHandle, ChatClient, ClientState,
    ConfigOverrides, HttpBackend, PaletteConfig,
};
use render::Renderer;

/// Palette - streaming chat with image generation
#[derive(Parser, Debug)]
#[command(name = "palette")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Prompt to send; starts an interactive session when omitted
    #[arg(value_name = "PROMPT", trailing_var_arg = true)]
    prompt: Vec<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PALETTE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat service base URL
    #[arg(long, env = "PALETTE_BASE_URL", value_name = "URL")]
    base_url: Option<String>,

    /// Do not generate images after replies
    #[arg(long)]
    no_images: bool,

    /// Directory to write generated images to
    #[arg(long, value_name = "DIR")]
    image_dir: Option<PathBuf>,

    /// Write the transcript as JSON on exit
    #[arg(long, value_name = "FILE")]
    transcript: Option<PathBuf>,

    /// Log at debug level
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.base_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if self.no_images {
            overrides = overrides.with_generate_images(false);
        }
        overrides
    }
}

/// Initialize logging on stderr; stdout carries only the conversation
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("palette={level},palette_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration before the runtime starts
fn resolve_config(args: &Args) -> Result<PaletteConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let overrides = args.overrides();
    overrides.apply(&mut config);
    config.validate().context("Invalid command-line override")?;

    info!(
        source = %config.source(),
        base_url = %config.service.base_url,
        generate_images = config.chat.generate_images,
        "Configuration resolved"
    );
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = resolve_config(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(args, config))
}

async fn run(args: Args, config: PaletteConfig) -> Result<()> {
    let backend = HttpBackend::new(config.service.clone()).context("Failed to create HTTP client")?;
    let client = ChatClient::new(backend, config.chat.clone());
    let mut renderer = Renderer::new(client.transcript().clone(), tokio::io::stdout());

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_interrupts(
        client.subscribe_state(),
        client.cancel_handle(),
        shutdown.clone(),
    ));

    let result = if args.prompt.is_empty() {
        repl(&client, &mut renderer, &args, &shutdown).await
    } else {
        let input = args.prompt.join(" ");
        run_turn(&client, &mut renderer, &args, &input).await
    };

    if let Some(ref path) = args.transcript {
        export::save_transcript(client.transcript(), path).await?;
    }

    result
}

/// Run one workflow while rendering its progress
async fn run_turn(
    client: &ChatClient<HttpBackend>,
    renderer: &mut Renderer<Stdout>,
    args: &Args,
    input: &str,
) -> Result<()> {
    let turn = client.run_workflow(input);
    tokio::pin!(turn);

    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(pending) = renderer.recv() => renderer.render(pending).await?,
        }
    };
    renderer.drain().await?;

    let outcome = result?;
    if let (Some(id), Some(dir)) = (&outcome.image_id, &args.image_dir) {
        let path = export::save_image(client.transcript(), id, dir).await?;
        renderer
            .write_str(&format!("[saved {}]\n", path.display()))
            .await?;
    }
    Ok(())
}

/// Interactive session reading prompts from stdin
async fn repl(
    client: &ChatClient<HttpBackend>,
    renderer: &mut Renderer<Stdout>,
    args: &Args,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        renderer.write_str("> ").await?;

        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                client.transcript().clear();
                renderer.write_str("[cleared]\n").await?;
            }
            _ if input.starts_with("/save") => {
                let path = input.trim_start_matches("/save").trim();
                if path.is_empty() {
                    renderer.write_str("usage: /save <path>\n").await?;
                } else {
                    match export::save_transcript(client.transcript(), Path::new(path)).await {
                        Ok(()) => renderer.write_str(&format!("[saved {path}]\n")).await?,
                        Err(e) => warn!(error = %e, "Save failed"),
                    }
                }
            }
            _ => {
                if let Err(e) = run_turn(client, renderer, args, input).await {
                    warn!(error = %e, "Turn failed");
                }
            }
        }
    }

    renderer.write_str("\n").await?;
    Ok(())
}

/// Ctrl-C stops a running request, or exits when nothing is running
async fn watch_interrupts(
    state: watch::Receiver<ClientState>,
    cancel: CancelHandle,
    shutdown: CancellationToken,
) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }

        let current = *state.borrow();
        if current.is_busy() {
            info!(state = current.description(), "Interrupted, cancelling request");
            cancel.cancel();
        } else {
            info!("Interrupted while idle, exiting");
            shutdown.cancel();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_words_are_collected() {
        let args = Args::try_parse_from(["palette", "draw", "a", "fox"]).unwrap();
        assert_eq!(args.prompt, vec!["draw", "a", "fox"]);
        assert!(!args.no_images);
    }

    #[test]
    fn test_flags_become_overrides() {
        let args = Args::try_parse_from([
            "palette",
            "--base-url",
            "https://chat.example.com",
            "--no-images",
            "--image-dir",
            "art",
        ])
        .unwrap();
        assert!(args.prompt.is_empty());
        assert_eq!(args.image_dir, Some(PathBuf::from("art")));

        let mut config = PaletteConfig::default();
        args.overrides().apply(&mut config);
        assert_eq!(config.service.base_url, "https://chat.example.com");
        assert!(!config.chat.generate_images);
    }
}
