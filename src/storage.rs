//! Blob storage for uploaded images.
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key` and returns its public URL.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

/// Writes objects below a directory that the router serves under `/uploads`.
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub const MOUNT: &'static str = "/uploads";

    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self { root: root.into(), public_base_url: public_base_url.trim_end_matches('/').to_string() }
    }

    pub fn root(&self) -> &Path { &self.root }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe { return Err(StorageError::InvalidKey(key.to_string())); }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, size = bytes.len(), "Stored upload");
        Ok(format!("{}{}/{}", self.public_base_url, Self::MOUNT, key))
    }
}

/// File extension taken from an uploaded file name, `bin` when absent.
pub fn extension_of(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Some("leaf.JPG")), "jpg");
        assert_eq!(extension_of(Some("archive.tar.gz")), "gz");
        assert_eq!(extension_of(Some("noext")), "bin");
        assert_eq!(extension_of(Some("bad.p/ng")), "bin");
        assert_eq!(extension_of(None), "bin");
    }

    #[tokio::test]
    async fn test_put_writes_file_and_returns_url() {
        let root = std::env::temp_dir().join(format!("nursery-store-{}", uuid::Uuid::new_v4()));
        let store = FsBlobStore::new(&root, "http://localhost:3000/");
        let url = store.put("refunds/abc/1-x.png", b"png").await.unwrap();
        assert_eq!(url, "http://localhost:3000/uploads/refunds/abc/1-x.png");
        assert_eq!(tokio::fs::read(root.join("refunds/abc/1-x.png")).await.unwrap(), b"png");
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_put_rejects_traversal() {
        let store = FsBlobStore::new(std::env::temp_dir(), "http://localhost");
        assert!(matches!(store.put("../etc/passwd", b"x").await, Err(StorageError::InvalidKey(_))));
        assert!(matches!(store.put("/abs", b"x").await, Err(StorageError::InvalidKey(_))));
    }
}
