use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

/// Content type of every uploaded video
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Destination for uploaded videos.
///
/// Network retries, TLS and credentials are the implementation's concern.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` under `key`, overwriting any existing object
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;

    /// Time-limited GET URL for `key`
    async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String>;
}

/// S3-compatible object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    multipart_threshold_bytes: usize,
    part_size_bytes: usize,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/R2/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            multipart_threshold_bytes: config.multipart_threshold_bytes,
            part_size_bytes: config.part_size_bytes,
        })
    }

    /// Single-part upload streamed from disk
    async fn simple_upload(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload video to S3")?;

        Ok(())
    }

    /// Multipart upload for large videos, reading one part at a time
    async fn multipart_upload(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to create multipart upload")?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?;

        match self.upload_parts(key, path, upload_id).await {
            Ok(completed_parts) => {
                let completed_upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .multipart_upload(completed_upload)
                    .send()
                    .await
                    .context("Failed to complete multipart upload")?;

                Ok(())
            }
            Err(e) => {
                // Leave no dangling parts behind in the bucket
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        path: &Path,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut completed_parts = Vec::new();
        let mut part_number = 1;

        loop {
            let mut chunk = Vec::with_capacity(self.part_size_bytes);
            let read = (&mut file)
                .take(self.part_size_bytes as u64)
                .read_to_end(&mut chunk)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            if read == 0 {
                break;
            }

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .context("Failed to upload part")?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
            part_number += 1;
        }

        Ok(completed_parts)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let size_bytes = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        debug!(size_bytes, "Uploading video to S3");

        if size_bytes > self.multipart_threshold_bytes as u64 {
            self.multipart_upload(key, path, content_type).await?;
        } else {
            self.simple_upload(key, path, content_type).await?;
        }

        info!(size_bytes, "Video uploaded successfully");
        Ok(())
    }

    async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String> {
        let presigning_config =
            PresigningConfig::expires_in(expiry).context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        Ok(presigned.uri().to_string())
    }
}
