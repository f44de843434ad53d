// Product images for outbound messages
//
// The Cloud API needs a public URL. Images stored inline as `data:` URIs are
// uploaded to object storage first, keyed by the SHA-256 of their bytes so
// repeated uploads land on the same object.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StorageConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object storage is not configured")]
    NotConfigured,

    #[error("Invalid inline image: {0}")]
    InvalidDataUri(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload failed (status {status}): {message}")]
    Upload { status: u16, message: String },
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the object and returns its public URL
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError>;
}

/// Decoded `data:<mime>;base64,<payload>` image
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub fn decode_data_uri(uri: &str) -> Result<InlineImage, StorageError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| StorageError::InvalidDataUri("missing data: prefix".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| StorageError::InvalidDataUri("missing payload".into()))?;
    let content_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| StorageError::InvalidDataUri("only base64 payloads are supported".into()))?;
    if !content_type.starts_with("image/") {
        return Err(StorageError::InvalidDataUri(format!("not an image: {}", content_type)));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| StorageError::InvalidDataUri(e.to_string()))?;

    Ok(InlineImage {
        content_type: content_type.to_string(),
        bytes,
    })
}

/// `<sha256 hex>.<ext>`
pub fn object_key(image: &InlineImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&image.bytes);
    let extension = match image.content_type.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    };
    format!("{:x}.{}", hasher.finalize(), extension)
}

pub struct SupabaseStorage {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(config: &StorageConfig, timeout: Duration) -> Result<Self, StorageError> {
        let (Some(base_url), Some(service_key)) = (&config.supabase_url, &config.service_key) else {
            return Err(StorageError::NotConfigured);
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.clone(),
            bucket: config.bucket.clone(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!("Uploaded product image {}", key);
        Ok(self.public_url(key))
    }
}

/// Turns a stored product image into something the Cloud API can fetch
#[derive(Clone)]
pub struct ImageResolver {
    storage: Option<Arc<dyn ObjectStorage>>,
}

impl ImageResolver {
    pub fn new(storage: Option<Arc<dyn ObjectStorage>>) -> Self {
        Self { storage }
    }

    pub async fn public_url(&self, image: &str) -> Result<String, StorageError> {
        if image.starts_with("http://") || image.starts_with("https://") {
            return Ok(image.to_string());
        }

        let inline = decode_data_uri(image)?;
        let storage = self.storage.as_ref().ok_or(StorageError::NotConfigured)?;
        let key = object_key(&inline);
        storage.upload(&key, &inline.content_type, inline.bytes).await
    }
}
