use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::download;
use crate::progress::ProgressSink;

/// A single video resolved from a locator.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Direct URL of the selected media stream.
    pub stream_url: String,
    /// Byte size from the probe; the source may only know an estimate.
    pub size_hint: Option<u64>,
}

/// A playlist expanded into its member locators.
#[derive(Debug, Clone)]
pub struct Collection {
    pub title: String,
    pub members: Vec<String>,
}

/// Whether a locator names a playlist rather than a single video.
pub fn is_playlist(url: &str) -> bool {
    url.contains("playlist")
}

/// Resolves locators to media items and fetches their streams.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Cheap metadata resolution; does not transfer the media payload.
    async fn resolve(&self, url: &str) -> Result<MediaItem>;

    /// Expand a playlist locator into its member locators.
    async fn expand(&self, url: &str) -> Result<Collection>;

    /// Download the media stream to a fresh file under `dest`.
    async fn fetch(
        &self,
        item: &MediaItem,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf>;
}

/// yt-dlp backed source: metadata via `--dump-json`, payload via HTTP.
pub struct YtDlpSource {
    client: reqwest::Client,
}

impl YtDlpSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn resolve(&self, url: &str) -> Result<MediaItem> {
        let raw = run_ytdlp(&[
            "--no-playlist",
            "--format",
            "best",
            "--dump-json",
            "--no-warnings",
            url,
        ])
        .await?;
        parse_video_json(&raw)
    }

    async fn expand(&self, url: &str) -> Result<Collection> {
        let raw = run_ytdlp(&["--flat-playlist", "--dump-single-json", "--no-warnings", url]).await?;
        parse_playlist_json(&raw)
    }

    async fn fetch(
        &self,
        item: &MediaItem,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        download::stream_to_file(&self.client, item, dest, progress).await
    }
}

async fn run_ytdlp(args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new("yt-dlp")
        .args(args)
        .output()
        .await
        .context("Failed to execute yt-dlp")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("yt-dlp failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, Deserialize)]
struct VideoJson {
    id: String,
    title: String,
    channel: Option<String>,
    uploader: Option<String>,
    url: Option<String>,
    filesize: Option<u64>,
    // yt-dlp emits this as a float
    filesize_approx: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PlaylistJson {
    title: String,
    #[serde(default)]
    entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: Option<String>,
    url: Option<String>,
}

fn parse_video_json(raw: &str) -> Result<MediaItem> {
    let json: VideoJson =
        serde_json::from_str(raw).context("Unexpected yt-dlp metadata payload")?;

    let author = json
        .channel
        .or(json.uploader)
        .unwrap_or_else(|| "unknown".to_string());

    let stream_url = match json.url {
        Some(url) => url,
        None => bail!("No downloadable stream reported for video {}", json.id),
    };

    let size_hint = json
        .filesize
        .or_else(|| json.filesize_approx.map(|size| size as u64));

    Ok(MediaItem {
        id: json.id,
        title: json.title,
        author,
        stream_url,
        size_hint,
    })
}

fn parse_playlist_json(raw: &str) -> Result<Collection> {
    let json: PlaylistJson =
        serde_json::from_str(raw).context("Unexpected yt-dlp playlist payload")?;

    let members = json
        .entries
        .into_iter()
        .filter_map(|entry| {
            entry.url.or_else(|| {
                entry
                    .id
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })
        })
        .collect();

    Ok(Collection {
        title: json.title,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_locators_are_recognized_by_substring() {
        assert!(is_playlist(
            "https://www.youtube.com/playlist?list=PL123"
        ));
        assert!(!is_playlist("https://www.youtube.com/watch?v=abc123"));
    }

    #[test]
    fn video_json_maps_to_media_item() {
        let raw = r#"{
            "id": "abc123",
            "title": "Intro: Part 1",
            "channel": "Jane Doe",
            "uploader": "jdoe42",
            "url": "https://cdn.example/stream.mp4",
            "filesize": 1048576
        }"#;
        let item = parse_video_json(raw).unwrap();
        assert_eq!(item.author, "Jane Doe");
        assert_eq!(item.title, "Intro: Part 1");
        assert_eq!(item.stream_url, "https://cdn.example/stream.mp4");
        assert_eq!(item.size_hint, Some(1048576));
    }

    #[test]
    fn uploader_backfills_missing_channel() {
        let raw = r#"{
            "id": "abc123",
            "title": "t",
            "uploader": "jdoe42",
            "url": "https://cdn.example/stream.mp4",
            "filesize_approx": 2048.7
        }"#;
        let item = parse_video_json(raw).unwrap();
        assert_eq!(item.author, "jdoe42");
        assert_eq!(item.size_hint, Some(2048));
    }

    #[test]
    fn video_without_stream_url_is_an_error() {
        let raw = r#"{"id": "abc123", "title": "t", "channel": "c"}"#;
        assert!(parse_video_json(raw).is_err());
    }

    #[test]
    fn playlist_entries_expand_to_watch_urls() {
        let raw = r#"{
            "title": "Rust 101",
            "entries": [
                {"id": "v1", "url": "https://www.youtube.com/watch?v=v1"},
                {"id": "v2"},
                {}
            ]
        }"#;
        let collection = parse_playlist_json(raw).unwrap();
        assert_eq!(collection.title, "Rust 101");
        assert_eq!(
            collection.members,
            vec![
                "https://www.youtube.com/watch?v=v1".to_string(),
                "https://www.youtube.com/watch?v=v2".to_string(),
            ]
        );
    }
}
