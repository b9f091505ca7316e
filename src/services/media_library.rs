//! Permanent media collections: the capability a target entity exposes so
//! staged uploads can be attached to it.

use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::models::{CustomProperties, MediaTargetRef};
use crate::utils::validation::sanitize_filename;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Source file missing: {0}")]
    SourceMissing(String),

    #[error("Collection not accepted: {0}")]
    CollectionRejected(String),

    #[error("Invalid path segment: {0}")]
    InvalidSegment(String),

    #[error("Media backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata carried from the staged upload into the permanent collection
#[derive(Debug, Clone, Serialize)]
pub struct MediaAttachment {
    pub temp_media_id: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    /// Sort key within the collection
    pub order: i64,
    pub custom_properties: CustomProperties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedMedia {
    pub media_id: String,
    pub url: String,
}

/// An entity that owns named media collections.
#[async_trait]
pub trait HasMedia: Send + Sync {
    fn media_model_type(&self) -> &str;

    /// Empty while the entity has not been persisted
    fn media_model_id(&self) -> String;

    fn accepts_collection(&self, _collection_name: &str) -> bool {
        true
    }

    async fn attach_media(
        &self,
        collection_name: &str,
        file_path: &Path,
        attachment: MediaAttachment,
    ) -> Result<AttachedMedia, AttachError>;

    fn target_ref(&self) -> MediaTargetRef {
        MediaTargetRef {
            model_type: self.media_model_type().to_string(),
            model_id: self.media_model_id(),
        }
    }
}

/// Permanent media store shared by many entities
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    async fn attach(
        &self,
        target: &MediaTargetRef,
        file_path: &Path,
        collection_name: &str,
        attachment: &MediaAttachment,
    ) -> Result<AttachedMedia, AttachError>;
}

/// Media library on the local filesystem.
///
/// Files land at `{base}/{model_type}/{model_id}/{collection}/{media_id}/{name}`
/// with a `media.json` manifest holding the attachment metadata.
#[derive(Debug, Clone)]
pub struct LocalMediaLibrary {
    base_path: PathBuf,
    base_url: String,
}

impl LocalMediaLibrary {
    pub fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: base_url.into(),
        }
    }

    fn check_segment(segment: &str) -> Result<&str, AttachError> {
        let valid = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(segment)
        } else {
            Err(AttachError::InvalidSegment(segment.to_string()))
        }
    }
}

#[async_trait]
impl MediaLibrary for LocalMediaLibrary {
    async fn attach(
        &self,
        target: &MediaTargetRef,
        file_path: &Path,
        collection_name: &str,
        attachment: &MediaAttachment,
    ) -> Result<AttachedMedia, AttachError> {
        let media_id = Uuid::new_v4().to_string();
        let file_name = sanitize_filename(&attachment.original_name)
            .map_err(|e| AttachError::Backend(e.to_string()))?;

        let relative = format!(
            "{}/{}/{}/{}",
            Self::check_segment(&target.model_type)?,
            Self::check_segment(&target.model_id)?,
            Self::check_segment(collection_name)?,
            media_id
        );
        let dir = self.base_path.join(&relative);
        fs::create_dir_all(&dir).await?;

        if let Err(e) = fs::copy(file_path, dir.join(&file_name)).await {
            let _ = fs::remove_dir_all(&dir).await;
            return Err(if e.kind() == ErrorKind::NotFound {
                AttachError::SourceMissing(file_path.display().to_string())
            } else {
                AttachError::Io(e)
            });
        }

        let manifest = serde_json::to_vec_pretty(attachment)
            .map_err(|e| AttachError::Backend(e.to_string()))?;
        fs::write(dir.join("media.json"), manifest).await?;

        tracing::debug!(
            media_id = %media_id,
            collection = %collection_name,
            model_id = %target.model_id,
            "Media attached"
        );

        Ok(AttachedMedia {
            url: format!(
                "{}/{}/{}",
                self.base_url.trim_end_matches('/'),
                relative,
                file_name
            ),
            media_id,
        })
    }
}

/// Ready-made `HasMedia` target backed by a shared `MediaLibrary`
#[derive(Clone)]
pub struct MediaModel {
    model_type: String,
    model_id: String,
    collections: Option<Vec<String>>,
    library: Arc<dyn MediaLibrary>,
}

impl MediaModel {
    pub fn new(
        model_type: impl Into<String>,
        model_id: impl Into<String>,
        library: Arc<dyn MediaLibrary>,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            model_id: model_id.into(),
            collections: None,
            library,
        }
    }

    /// Restrict the entity to the given collection names
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = Some(collections.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl HasMedia for MediaModel {
    fn media_model_type(&self) -> &str {
        &self.model_type
    }

    fn media_model_id(&self) -> String {
        self.model_id.clone()
    }

    fn accepts_collection(&self, collection_name: &str) -> bool {
        match &self.collections {
            Some(allowed) => allowed.iter().any(|c| c == collection_name),
            None => true,
        }
    }

    async fn attach_media(
        &self,
        collection_name: &str,
        file_path: &Path,
        attachment: MediaAttachment,
    ) -> Result<AttachedMedia, AttachError> {
        if !self.accepts_collection(collection_name) {
            return Err(AttachError::CollectionRejected(collection_name.to_string()));
        }
        self.library
            .attach(&self.target_ref(), file_path, collection_name, &attachment)
            .await
    }
}
