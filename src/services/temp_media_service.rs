use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::{MAX_TTL_HOURS, TempMediaConfig};
use crate::entities::temp_media;
use crate::error::{TempMediaError, TempMediaResult};
use crate::models::{OwnerToken, TempMediaIdValidation, TempMediaUploadDto, UploadedFile};
use crate::services::notifications::{NotificationSink, TempMediaEvent, notify};
use crate::services::staging::StagingArea;
use crate::services::temp_media_store::TempMediaStore;
use crate::utils::retry::with_retry;
use crate::utils::validation::validate_upload;

pub struct TempMediaService {
    store: TempMediaStore,
    staging: Arc<dyn StagingArea>,
    notifications: Arc<dyn NotificationSink>,
    config: TempMediaConfig,
}

impl TempMediaService {
    pub fn new(
        store: TempMediaStore,
        staging: Arc<dyn StagingArea>,
        notifications: Arc<dyn NotificationSink>,
        config: TempMediaConfig,
    ) -> Self {
        Self {
            store,
            staging,
            notifications,
            config,
        }
    }

    pub fn store(&self) -> &TempMediaStore {
        &self.store
    }

    pub fn staging(&self) -> &Arc<dyn StagingArea> {
        &self.staging
    }

    pub fn notifications(&self) -> &Arc<dyn NotificationSink> {
        &self.notifications
    }

    pub fn config(&self) -> &TempMediaConfig {
        &self.config
    }

    /// Stage an upload for later transfer.
    ///
    /// Validation runs before anything is written. The file is written
    /// before the row, and removed again if the row cannot be stored.
    #[tracing::instrument(skip(self, file), fields(file_name = %file.original_name, size = file.size()))]
    pub async fn upload_temp_media(
        &self,
        file: UploadedFile,
        owner: OwnerToken,
        ttl_hours: Option<i64>,
    ) -> TempMediaResult<TempMediaUploadDto> {
        if owner.is_empty() {
            return Err(TempMediaError::Validation(
                "A session id or user id is required".to_string(),
            ));
        }

        let ttl_hours = ttl_hours.unwrap_or(self.config.default_ttl_hours);
        if !(1..=MAX_TTL_HOURS).contains(&ttl_hours) {
            return Err(TempMediaError::Validation(format!(
                "TTL must be between 1 and {} hours, got {}",
                MAX_TTL_HOURS, ttl_hours
            )));
        }

        let upload = validate_upload(&file, &self.config.validation_rules())?;

        let id = Uuid::new_v4().to_string();
        let checksum = format!("{:016x}", xxh3_64(&file.data));
        let file_path = self
            .staging
            .put(&id, &upload.original_name, file.data.clone())
            .await?;

        let created_at = Utc::now();
        let expires_at = created_at + Duration::hours(ttl_hours);
        let row = TempMediaStore::new_row(
            id.clone(),
            file_path.clone(),
            &upload,
            checksum,
            &owner,
            created_at,
            expires_at,
        );

        let temp_media = match self.store.insert(row).await {
            Ok(model) => model,
            Err(e) => {
                tracing::error!("Failed to persist temp media {}: {}", id, e);
                if let Err(cleanup) = self.staging.delete(&file_path).await {
                    tracing::warn!("Orphaned staged file {}: {}", file_path, cleanup);
                }
                return Err(e.into());
            }
        };

        let dto = TempMediaUploadDto {
            id: temp_media.id.clone(),
            url: self.staging.url(&temp_media.file_path),
            original_name: temp_media.original_name.clone(),
            mime_type: temp_media.mime_type.clone(),
            size_bytes: temp_media.size_bytes,
            expires_at: temp_media.expires_at,
        };

        tracing::info!(temp_media_id = %dto.id, "Temporary media staged");
        notify(
            self.notifications.as_ref(),
            TempMediaEvent::Uploaded {
                temp_media,
                upload_dto: dto.clone(),
            },
        );

        Ok(dto)
    }

    /// The record, only while it is active and unexpired
    pub async fn get_temp_media(&self, id: &str) -> TempMediaResult<Option<temp_media::Model>> {
        Ok(self.store.find_active(id, Utc::now()).await?)
    }

    /// Split ids into usable and unusable, keeping input order in both
    pub async fn validate_temp_media_ids(&self, ids: &[String]) -> TempMediaResult<TempMediaIdValidation> {
        let active: HashSet<String> = self
            .store
            .find_active_many(ids, Utc::now())
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        let (valid, invalid) = ids.iter().cloned().partition(|id| active.contains(id));
        Ok(TempMediaIdValidation { valid, invalid })
    }

    /// Remove a staged upload and its file. `false` when there was nothing
    /// to delete or a transfer currently holds the record.
    pub async fn delete_temp_media(&self, id: &str) -> TempMediaResult<bool> {
        let Some(existing) = self.store.find(id).await? else {
            return Ok(false);
        };

        let stale_before = Utc::now() - self.config.claim_timeout();
        if !self.store.delete_unclaimed(id, stale_before).await? {
            tracing::warn!(temp_media_id = %id, "Temp media not deleted: missing or being transferred");
            return Ok(false);
        }

        let staging = self.staging.as_ref();
        let key = existing.file_path.as_str();
        let removed = with_retry("staging delete", self.config.io_retry_attempts, move || {
            staging.delete(key)
        })
        .await;

        match removed {
            Ok(false) => tracing::warn!("Staged file already missing: {}", existing.file_path),
            Ok(true) => {}
            Err(e) => tracing::error!("Failed to delete staged file {}: {}", existing.file_path, e),
        }

        tracing::info!(temp_media_id = %id, "Temporary media deleted");
        Ok(true)
    }

    /// Active → Processed for exactly the given ids; others are skipped
    pub async fn mark_as_processed(&self, ids: &[String]) -> TempMediaResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let store = &self.store;
        let now = Utc::now();
        let changed = with_retry("mark processed", self.config.io_retry_attempts, move || {
            store.mark_processed(ids, now)
        })
        .await?;

        if changed as usize != ids.len() {
            tracing::debug!(
                "Marked {} of {} temp media as processed",
                changed,
                ids.len()
            );
        }
        Ok(())
    }
}
