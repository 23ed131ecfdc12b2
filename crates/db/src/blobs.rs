use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use recarga_core::domain::order::OrderId;
use recarga_core::errors::ConversationError;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob io error for `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
}

impl From<BlobError> for ConversationError {
    fn from(error: BlobError) -> Self {
        ConversationError::Internal(error.to_string())
    }
}

/// Storage for uploaded payment proofs. `put` returns the reference that is
/// embedded in order records and operator notifications.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, BlobError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;
}

/// File name for the proof of `order_id`, with an extension derived from the MIME type.
pub fn screenshot_key(order_id: &OrderId, mime_type: Option<&str>) -> String {
    let extension = match mime_type.map(|m| m.trim().to_ascii_lowercase()) {
        Some(m) if m == "image/png" => "png",
        Some(m) if m == "image/webp" => "webp",
        Some(m) if m == "image/gif" => "gif",
        _ => "jpg",
    };
    format!("{}.{extension}", order_id.0)
}

fn validate_key(key: &str) -> Result<(), BlobError> {
    let valid = !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(key.to_owned()))
    }
}

pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self { root: root.into(), public_base_url }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reference(&self, key: &str, path: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{key}", base.trim_end_matches('/')),
            None => path.display().to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, BlobError> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| BlobError::Io { path: self.root.clone(), source })?;

        let path = self.root.join(key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| BlobError::Io { path: path.clone(), source })?;

        tracing::debug!(
            event_name = "storage.blob.stored",
            key,
            size = bytes.len(),
            "stored blob"
        );
        Ok(self.reference(key, &path))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        validate_key(key)?;
        let path = self.root.join(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BlobError::Io { path, source }),
        }
    }
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, BlobError> {
        validate_key(key)?;
        let mut blobs = self.blobs.write().await;
        blobs.insert(key.to_owned(), bytes.to_vec());
        Ok(format!("memory://{key}"))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).cloned())
    }
}
