//! Writing images and transcripts to disk

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use palette_core::{ImagePayload, MessageId, Transcript};

/// Write the image message `id` to `<dir>/<id>.<ext>`
pub async fn save_image(transcript: &Transcript, id: &MessageId, dir: &Path) -> Result<PathBuf> {
    let message = transcript
        .get(id)
        .with_context(|| format!("image message {id} is no longer in the transcript"))?;
    let payload = ImagePayload::from_data_url(&message.content)
        .with_context(|| format!("message {id} does not hold a base64 data URL"))?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create image directory: {}", dir.display()))?;

    let path = dir.join(format!("{id}.{}", payload.file_extension()));
    tokio::fs::write(&path, &payload.bytes)
        .await
        .with_context(|| format!("Failed to write image: {}", path.display()))?;

    tracing::info!(path = %path.display(), size = payload.bytes.len(), "Image saved");
    Ok(path)
}

/// Write the transcript as JSON
pub async fn save_transcript(transcript: &Transcript, path: &Path) -> Result<()> {
    let json = transcript.to_json().context("Failed to serialize transcript")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write transcript: {}", path.display()))?;

    tracing::info!(path = %path.display(), messages = transcript.len(), "Transcript saved");
    Ok(())
}
