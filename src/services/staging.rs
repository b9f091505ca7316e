//! File staging area for uploads that have no owning record yet.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Staging write failed: {0}")]
    WriteFailed(String),

    #[error("Staging delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid staging key: {0}")]
    InvalidKey(String),

    #[error("Staging configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type StagingResult<T> = Result<T, StagingError>;

#[async_trait]
pub trait StagingArea: Send + Sync {
    /// Store `data` for the upload `id` and return its staging key
    async fn put(&self, id: &str, file_name: &str, data: Bytes) -> StagingResult<String>;

    /// Remove a staged file. `Ok(false)` when it was already gone.
    async fn delete(&self, key: &str) -> StagingResult<bool>;

    async fn exists(&self, key: &str) -> StagingResult<bool>;

    /// Filesystem location the permanent store reads the content from
    fn resolve(&self, key: &str) -> StagingResult<PathBuf>;

    /// Preview URL for a staged file
    fn url(&self, key: &str) -> String;
}

/// Local filesystem staging area
#[derive(Debug, Clone)]
pub struct LocalStagingArea {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStagingArea {
    pub async fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> StagingResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StagingError::ConfigError(format!(
                "Failed to create staging directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(Self {
            base_path,
            base_url: base_url.into(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, key: &str) -> StagingResult<PathBuf> {
        if key.is_empty()
            || key.contains("..")
            || key.contains('\\')
            || key.starts_with('/')
        {
            return Err(StagingError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }

    /// `{id}.{ext}`, with the extension reduced to lowercase alphanumerics
    fn generate_key(id: &str, file_name: &str) -> String {
        let ext: String = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(10)
            .collect::<String>()
            .to_lowercase();

        if ext.is_empty() {
            id.to_string()
        } else {
            format!("{}.{}", id, ext)
        }
    }
}

#[async_trait]
impl StagingArea for LocalStagingArea {
    async fn put(&self, id: &str, file_name: &str, data: Bytes) -> StagingResult<String> {
        let key = Self::generate_key(id, file_name);
        let path = self.key_to_path(&key)?;
        let part_path = path.with_extension("part");

        let write = async {
            let mut file = fs::File::create(&part_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&part_path, &path).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&part_path).await;
            return Err(StagingError::WriteFailed(format!(
                "{}: {}",
                path.display(),
                e
            )));
        }

        tracing::debug!(key = %key, size_bytes = data.len(), "Staged upload written");
        Ok(key)
    }

    async fn delete(&self, key: &str) -> StagingResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StagingError::DeleteFailed(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> StagingResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn resolve(&self, key: &str) -> StagingResult<PathBuf> {
        self.key_to_path(key)
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}
