use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::progress::{remaining_of, ProgressSink};

/// Uploads above this size go through the multipart API so progress can
/// be reported per part.
const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;
const PART_SIZE: usize = 8 * 1024 * 1024;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local file missing: {0}")]
    LocalFileMissing(String),
    #[error("credentials not available: {0}")]
    Credentials(String),
    #[error("access denied to bucket {bucket}: {message}")]
    AccessDenied { bucket: String, message: String },
    #[error("bucket does not exist: {0}")]
    NoSuchBucket(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable storage handle, constructed once at startup and passed down
/// through the pipeline.
#[async_trait]
pub trait Storage: Send + Sync {
    fn bucket(&self) -> &str;

    /// `Ok(())` means the active credentials can enumerate buckets and
    /// read this bucket. A missing bucket is not a failure here; the
    /// bucket check decides what to do about that.
    async fn verify_access(&self) -> StorageResult<()>;

    async fn bucket_exists(&self) -> StorageResult<bool>;

    async fn create_bucket(&self) -> StorageResult<()>;

    /// `Ok(false)` only for a definitive "not found"; any other failure
    /// must surface as an error, never as absence.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        progress: &dyn ProgressSink,
    ) -> StorageResult<()>;
}

/// S3 storage backend.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Build the client from the ambient AWS configuration. A custom
    /// `endpoint_url` switches to path-style addressing for
    /// S3-compatible providers such as MinIO.
    pub async fn new(bucket: String, region: Option<String>, endpoint_url: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;

        let client = if let Some(endpoint) = endpoint_url {
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        Self { client, bucket }
    }

    fn upload_error<E, R>(&self, err: SdkError<E, R>) -> StorageError
    where
        E: ProvideErrorMetadata,
    {
        match err.code() {
            Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
                StorageError::Credentials(format!("{err}"))
            }
            Some("AccessDenied") => StorageError::AccessDenied {
                bucket: self.bucket.clone(),
                message: format!("{err}"),
            },
            Some("NoSuchBucket") => StorageError::NoSuchBucket(self.bucket.clone()),
            _ => match &err {
                SdkError::DispatchFailure(_) | SdkError::ConstructionFailure(_) => {
                    StorageError::Credentials(format!("{err}"))
                }
                _ => StorageError::UploadFailed(format!("{err}")),
            },
        }
    }

    async fn upload_multipart(
        &self,
        path: &Path,
        key: &str,
        total: u64,
        progress: &dyn ProgressSink,
    ) -> StorageResult<()> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type("video/mp4")
            .send()
            .await
            .map_err(|e| self.upload_error(e))?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| StorageError::UploadFailed("no upload ID returned".to_string()))?
            .to_string();

        let mut file = File::open(path)
            .await
            .map_err(|_| StorageError::LocalFileMissing(path.display().to_string()))?;

        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut transferred = 0u64;
        let mut buf = vec![0u8; PART_SIZE];

        loop {
            let mut filled = 0usize;
            while filled < PART_SIZE {
                let n = file.read(&mut buf[filled..]).await.map_err(|e| {
                    StorageError::UploadFailed(format!(
                        "failed to read {}: {e}",
                        path.display()
                    ))
                })?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }

            let part = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buf[..filled].to_vec()))
                .send()
                .await
                .map_err(|e| self.upload_error(e))?;

            let etag = part
                .e_tag()
                .ok_or_else(|| {
                    StorageError::UploadFailed(format!("no ETag returned for part {part_number}"))
                })?
                .to_string();

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );

            transferred += filled as u64;
            progress.on_chunk(filled as u64, remaining_of(total, transferred), total);
            part_number += 1;

            if filled < PART_SIZE {
                break;
            }
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| self.upload_error(e))?;

        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn verify_access(&self) -> StorageResult<()> {
        if let Err(e) = self.client.list_buckets().send().await {
            return Err(match &e {
                SdkError::DispatchFailure(_) | SdkError::ConstructionFailure(_) => {
                    StorageError::Credentials(format!("{e}"))
                }
                _ => match e.code() {
                    Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
                        StorageError::Credentials(format!("{e}"))
                    }
                    Some("AccessDenied") => StorageError::AccessDenied {
                        bucket: self.bucket.clone(),
                        message: format!("{e}"),
                    },
                    _ => StorageError::Backend(format!("{e}")),
                },
            });
        }

        match self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            // The bucket check downstream decides whether to create it.
            Err(e) if e.code() == Some("NoSuchBucket") => Ok(()),
            Err(e) => Err(match e.code() {
                Some("AccessDenied") => StorageError::AccessDenied {
                    bucket: self.bucket.clone(),
                    message: format!("{e}"),
                },
                _ => StorageError::Backend(format!("{e}")),
            }),
        }
    }

    async fn bucket_exists(&self) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadBucketError::NotFound(_) => Ok(false),
                    _ => Err(StorageError::Backend(format!("{e}"))),
                },
                _ => Err(StorageError::Backend(format!("{e}"))),
            },
        }
    }

    async fn create_bucket(&self) -> StorageResult<()> {
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("{e}")))?;

        info!("Bucket created: {}", self.bucket);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => Ok(false),
                    _ => Err(StorageError::Backend(format!("{e}"))),
                },
                _ => Err(StorageError::Backend(format!("{e}"))),
            },
        }
    }

    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        progress: &dyn ProgressSink,
    ) -> StorageResult<()> {
        let total = tokio::fs::metadata(path)
            .await
            .map_err(|_| StorageError::LocalFileMissing(path.display().to_string()))?
            .len();

        if total <= MULTIPART_THRESHOLD {
            let body = ByteStream::from_path(path)
                .await
                .map_err(|_| StorageError::LocalFileMissing(path.display().to_string()))?;

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type("video/mp4")
                .body(body)
                .send()
                .await
                .map_err(|e| self.upload_error(e))?;

            progress.on_chunk(total, 0, total);
        } else {
            self.upload_multipart(path, key, total, progress).await?;
        }

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = total,
            "Upload successful"
        );
        Ok(())
    }
}
