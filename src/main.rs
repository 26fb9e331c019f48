use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod download;
mod key;
mod pipeline;
mod progress;
mod source;
mod storage;

use pipeline::{parse_decision, preflight, BucketDecision, Outcome, Pipeline, ProgressFactory};
use progress::{ConsoleProgress, ProgressSink};
use source::YtDlpSource;
use storage::S3Storage;

#[derive(Parser)]
#[command(name = "yt2s3")]
#[command(about = "Download YouTube videos or playlists and archive them to an S3 bucket")]
struct Cli {
    /// Video or playlist URLs, comma separated
    urls: String,

    /// Target bucket (just the name, not the full ARN)
    #[arg(short, long, env = "YT2S3_BUCKET")]
    bucket: String,

    /// Directory for in-flight downloads (defaults to the home directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Custom endpoint for S3-compatible providers
    #[arg(long)]
    endpoint_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let dest = match cli.output {
        Some(dir) => dir,
        None => directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .context("Could not determine a home directory; pass --output")?,
    };
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let storage = S3Storage::new(cli.bucket, cli.region, cli.endpoint_url).await;

    preflight(&storage, &mut ask_create_bucket).await?;

    let source = YtDlpSource::new();
    let progress: &ProgressFactory =
        &|label, total| Box::new(ConsoleProgress::bytes(label, total)) as Box<dyn ProgressSink>;
    let pipeline = Pipeline::new(&storage, &source, dest, progress);

    let mut published = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for locator in cli.urls.split(',').map(str::trim).filter(|u| !u.is_empty()) {
        for outcome in pipeline.process_locator(locator).await {
            match outcome {
                Outcome::Published { .. } => published += 1,
                Outcome::Skipped { .. } => skipped += 1,
                _ => failed += 1,
            }
        }
    }

    info!(
        "Done: {} uploaded, {} skipped, {} failed",
        published, skipped, failed
    );
    Ok(())
}

/// Blocking console prompt for the bucket creation decision.
fn ask_create_bucket(bucket: &str) -> BucketDecision {
    print!("The bucket '{bucket}' does not exist. Do you want to create it? (yes/no): ");
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return BucketDecision::Invalid;
    }
    parse_decision(&answer)
}
