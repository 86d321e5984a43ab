//! Object storage for synthesized audio artifacts.
//!
//! Artifacts are stored under the `audio/` prefix with the creation timestamp
//! embedded in the key, which is what the retention sweeper parses back out.
//! Storage failures are never fatal to a pipeline run; callers degrade to a
//! reply without audio.

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use laingfy_core::ServiceError;
use rand::{Rng, distr::Alphanumeric};

/// Storage prefix for all audio artifacts.
pub const AUDIO_PREFIX: &str = "audio/";

/// Metadata stored alongside an audio artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMetadata {
    pub language: String,
    /// Creation time as a unix timestamp, also embedded in the key.
    pub created_at: i64,
}

/// Contract for the object storage service holding audio artifacts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: &ArtifactMetadata,
    ) -> Result<(), ServiceError>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ServiceError>;

    async fn delete(&self, key: &str) -> Result<(), ServiceError>;

    /// Whether the configured bucket exists and is reachable.
    async fn bucket_exists(&self) -> Result<bool, ServiceError>;

    /// The publicly addressable URL for a stored key.
    fn public_url(&self, key: &str) -> String;
}

/// Builds a globally unique artifact key from a creation timestamp and a
/// random six-character suffix.
pub fn artifact_key(created_at: i64) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(6)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{AUDIO_PREFIX}audio_{created_at}_{suffix}.mp3")
}

/// Parses the creation timestamp embedded in an artifact key.
///
/// Returns `None` for keys that do not follow the artifact naming scheme;
/// the sweeper skips those rather than deleting them.
pub fn artifact_timestamp(key: &str) -> Option<i64> {
    key.split('_').nth(1)?.parse().ok()
}

/// An `ArtifactStore` implementation backed by Amazon S3.
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3ArtifactStore {
    /// Connects to S3 using the standard AWS credential chain.
    pub async fn connect(bucket: String, region: String) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&aws_config),
            bucket,
            region,
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: &ArtifactMetadata,
    ) -> Result<(), ServiceError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type("audio/mpeg")
            .cache_control("max-age=3600")
            .metadata("language", &metadata.language)
            .metadata("timestamp", metadata.created_at.to_string())
            .send()
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ServiceError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| ServiceError::Storage(e.to_string()))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool, ServiceError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_not_found())
                {
                    Ok(false)
                } else {
                    Err(ServiceError::Storage(err.to_string()))
                }
            }
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}
