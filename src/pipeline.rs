use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::{error, info, warn};

use crate::key::{sanitize, storage_key};
use crate::progress::ProgressSink;
use crate::source::{is_playlist, MediaSource};
use crate::storage::Storage;

/// Builds one progress sink per transfer, labelled for the console.
pub type ProgressFactory = dyn Fn(&str, u64) -> Box<dyn ProgressSink> + Send + Sync;

/// Operator's answer to the bucket creation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketDecision {
    Create,
    Decline,
    Invalid,
}

/// Parse a yes/no answer; anything else is invalid input.
pub fn parse_decision(answer: &str) -> BucketDecision {
    match answer.trim().to_lowercase().as_str() {
        "yes" => BucketDecision::Create,
        "no" => BucketDecision::Decline,
        _ => BucketDecision::Invalid,
    }
}

/// Terminal state of one video's pipeline run.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Object already present; nothing was fetched or uploaded.
    Skipped { key: String },
    /// Uploaded and the local copy removed.
    Published { key: String },
    ResolveFailed,
    /// The existence check itself failed; not treated as absence.
    CheckFailed,
    FetchFailed,
    /// Upload failed; the local file is kept so the operator can retry
    /// without re-fetching.
    PublishFailed { local: PathBuf },
}

/// Run-fatal checks performed once before any transfer: credentials,
/// then bucket existence with an interactive creation decision.
pub async fn preflight(
    storage: &dyn Storage,
    confirm: &mut dyn FnMut(&str) -> BucketDecision,
) -> Result<()> {
    if let Err(e) = storage.verify_access().await {
        bail!("credential check failed: {e}");
    }

    if storage.bucket_exists().await? {
        info!("Bucket exists: {}", storage.bucket());
        return Ok(());
    }

    match confirm(storage.bucket()) {
        BucketDecision::Create => {
            storage.create_bucket().await?;
            Ok(())
        }
        BucketDecision::Decline => {
            bail!(
                "bucket {} does not exist and will not be created",
                storage.bucket()
            )
        }
        BucketDecision::Invalid => {
            bail!(
                "unrecognized answer; bucket {} was not created",
                storage.bucket()
            )
        }
    }
}

/// Sequential transfer pipeline over one storage bucket: existence
/// check, fetch, rename, publish, reclaim.
pub struct Pipeline<'a> {
    storage: &'a dyn Storage,
    source: &'a dyn MediaSource,
    dest: PathBuf,
    progress: &'a ProgressFactory,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        source: &'a dyn MediaSource,
        dest: PathBuf,
        progress: &'a ProgressFactory,
    ) -> Self {
        Self {
            storage,
            source,
            dest,
            progress,
        }
    }

    /// Run every video behind one locator. Playlist members carry the
    /// playlist title as a key prefix. A member's failure never stops
    /// the remaining members.
    pub async fn process_locator(&self, locator: &str) -> Vec<Outcome> {
        if is_playlist(locator) {
            let collection = match self.source.expand(locator).await {
                Ok(collection) => collection,
                Err(e) => {
                    warn!("Failed to expand playlist {}: {:#}", locator, e);
                    return vec![Outcome::ResolveFailed];
                }
            };
            info!(
                "Playlist {}: {} videos",
                collection.title,
                collection.members.len()
            );

            let mut outcomes = Vec::with_capacity(collection.members.len());
            for member in &collection.members {
                outcomes.push(self.transfer(member, Some(&collection.title)).await);
            }
            outcomes
        } else {
            vec![self.transfer(locator, None).await]
        }
    }

    /// Transfer a single video, short-circuiting if its object already
    /// exists. Every failure is converted into an `Outcome` here; none
    /// propagates to the caller.
    async fn transfer(&self, url: &str, collection: Option<&str>) -> Outcome {
        let item = match self.source.resolve(url).await {
            Ok(item) => item,
            Err(e) => {
                warn!("Failed to resolve {}: {:#}", url, e);
                return Outcome::ResolveFailed;
            }
        };

        let key = storage_key(&item.author, collection, &item.title);

        match self.storage.exists(&key).await {
            Ok(true) => {
                info!("Skipping {}: already in bucket as {}", item.title, key);
                return Outcome::Skipped { key };
            }
            Ok(false) => {}
            Err(e) => {
                error!("Could not check {} in bucket: {}", key, e);
                return Outcome::CheckFailed;
            }
        }

        let sink = (self.progress)(&format!("Downloading {}", item.title), item.size_hint.unwrap_or(0));
        let fetched = self.source.fetch(&item, &self.dest, sink.as_ref()).await;
        sink.finish();
        let fetched = match fetched {
            Ok(path) => path,
            Err(e) => {
                error!("Download failed for {}: {:#}", item.title, e);
                return Outcome::FetchFailed;
            }
        };

        // Give the local copy the same final name the object will carry.
        let local = self.dest.join(format!("{}.mp4", sanitize(&item.title)));
        if let Err(e) = tokio::fs::rename(&fetched, &local).await {
            error!(
                "Failed to move {} to {}: {}",
                fetched.display(),
                local.display(),
                e
            );
            return Outcome::FetchFailed;
        }

        let total = tokio::fs::metadata(&local).await.map(|m| m.len()).unwrap_or(0);
        let sink = (self.progress)("Uploading", total);
        let published = self.storage.upload_file(&local, &key, sink.as_ref()).await;
        sink.finish();
        if let Err(e) = published {
            error!("Upload failed for {}: {}", key, e);
            return Outcome::PublishFailed { local };
        }
        info!("Upload successful: {}", key);

        match tokio::fs::remove_file(&local).await {
            Ok(()) => info!("Deleted local file: {}", local.display()),
            Err(e) => warn!("Could not delete local file {}: {}", local.display(), e),
        }

        Outcome::Published { key }
    }
}
