//! Hosted object storage for avatars.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Largest accepted avatar, in bytes.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Not an accepted image type.
    #[error("Avatars must be PNG, JPEG or WebP images")]
    UnsupportedType(String),

    /// Larger than [`MAX_AVATAR_BYTES`].
    #[error("Avatars must be 2 MB or smaller")]
    TooLarge(usize),

    /// Empty upload.
    #[error("Choose an image to upload")]
    Empty,

    /// The storage API could not be reached.
    #[error("Storage unreachable: {0}")]
    Network(String),

    /// The storage API rejected the upload.
    #[error("Storage error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// API message.
        message: String,
    },
}

impl StorageError {
    /// Whether the uploader can fix this by choosing another file.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::UnsupportedType(_) | Self::TooLarge(_) | Self::Empty)
    }
}

/// A checked avatar upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarUpload {
    /// `image/png`, `image/jpeg` or `image/webp`.
    pub content_type: String,
    /// File extension for the content type.
    pub extension: &'static str,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl AvatarUpload {
    /// Check type and size.
    ///
    /// # Errors
    ///
    /// Returns a user-facing [`StorageError`] when the file is empty, too
    /// large, or not an accepted image type.
    pub fn new(content_type: &str, bytes: Vec<u8>) -> Result<Self, StorageError> {
        let content_type = content_type.trim().to_ascii_lowercase();
        let extension = match content_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            _ => return Err(StorageError::UnsupportedType(content_type)),
        };
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(StorageError::TooLarge(bytes.len()));
        }
        Ok(Self {
            content_type,
            extension,
            bytes,
        })
    }

    /// Object path, `{user_id}/{uuid}.{ext}`.
    #[must_use]
    pub fn path_for(&self, user_id: Uuid) -> String {
        format!("{user_id}/{}.{}", Uuid::new_v4(), self.extension)
    }
}

/// Stores avatar images and hands back their public URL.
#[async_trait]
pub trait AvatarStorage: Send + Sync {
    /// Upload (or overwrite) `path` and return its public URL.
    async fn upload(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError>;
}

/// Storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Project URL; the API lives under `{url}/storage/v1`.
    pub url: String,
    /// Service key with write access to the bucket.
    pub service_key: String,
    /// Public bucket holding avatars.
    pub bucket: String,
    /// HTTP timeout.
    pub timeout: Duration,
}

/// Object storage over the hosted REST API.
#[derive(Debug, Clone)]
pub struct HostedStorage {
    client: reqwest::Client,
    config: StorageConfig,
}

impl HostedStorage {
    /// Create a storage client.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Network`] if the HTTP client cannot be built.
    pub fn new(mut config: StorageConfig) -> Result<Self, StorageError> {
        config.url = config.url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Public URL of an object.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{path}",
            self.config.url, self.config.bucket
        )
    }
}

#[async_trait]
impl AvatarStorage for HostedStorage {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/{}/{path}",
                self.config.url, self.config.bucket
            ))
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(self.public_url(path))
    }
}
