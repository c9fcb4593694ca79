//! Resume blob storage: durable upload keyed by `{file_id}-{filename}` plus
//! the local staging copy the scoring collaborator reads from disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::errors::AppError;

/// Durable blob storage keyed by a path string; returns a retrievable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, AppError>;
}

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, AppError> {
        let content_type = guess_content_type(key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        // Signed GET valid for an hour, like the original storage collaborator.
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(
                PresigningConfig::expires_in(Duration::from_secs(3600))
                    .map_err(|e| AppError::Storage(e.to_string()))?,
            )
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        info!("Uploaded resume blob: {key}");
        Ok(presigned.uri().to_string())
    }
}

fn guess_content_type(key: &str) -> &'static str {
    let lower = key.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".docx") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    } else if lower.ends_with(".doc") {
        "application/msword"
    } else {
        "application/octet-stream"
    }
}

/// Writes the acquired bytes under the uploads directory so the scoring
/// collaborator can be handed a file path. Returns the staged path.
pub async fn stage_local_copy(
    upload_dir: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create {upload_dir}: {e}")))?;

    let path = Path::new(upload_dir).join(file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to write {path:?}: {e}")))?;

    Ok(path)
}

/// Removes the staged resume file after analysis. Missing files are fine; a
/// retried webhook may have cleaned up already.
pub async fn cleanup_local_copy(path: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Cleaned up staged resume: {path}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to clean up {path}: {e}"),
    }
}
