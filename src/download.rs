use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::progress::{remaining_of, ProgressSink};
use crate::source::MediaItem;

/// Stream a resolved media item to a fresh uuid-named file under `dest`,
/// reporting progress per chunk. The caller renames the file afterwards;
/// on failure a partial file may be left behind at the returned path.
pub async fn stream_to_file(
    client: &reqwest::Client,
    item: &MediaItem,
    dest: &Path,
    progress: &dyn ProgressSink,
) -> Result<PathBuf> {
    let path = dest.join(format!("{}_video.mp4", Uuid::new_v4()));
    info!("Downloading {} to {}", item.title, path.display());

    let response = client
        .get(&item.stream_url)
        .send()
        .await
        .context("Failed to request media stream")?
        .error_for_status()
        .context("Media stream request rejected")?;

    let total = response.content_length().or(item.size_hint).unwrap_or(0);

    let mut file = File::create(&path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut stream = response.bytes_stream();
    let mut transferred = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Media stream interrupted")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        transferred += chunk.len() as u64;
        progress.on_chunk(chunk.len() as u64, remaining_of(total, transferred), total);
    }

    file.flush().await?;

    info!("Downloaded: {}", item.title);
    Ok(path)
}
