use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;
use validator::Validate;

use crate::entities::temp_media::{self, TempMediaStatus};
use crate::error::{TempMediaError, TempMediaResult};
use crate::models::{
    CustomProperties, FailureReason, MediaTransferDto, OwnerToken, TempMediaTransferDto,
    TransferFailure, TransferStats, TransferredMedia,
};
use crate::services::expiry_sweeper::ExpirySweeper;
use crate::services::media_library::{HasMedia, MediaAttachment};
use crate::services::notifications::{TempMediaEvent, notify};
use crate::services::temp_media_service::TempMediaService;

/// Process-lifetime counters
#[derive(Default)]
struct TransferCounters {
    requests: AtomicU64,
    transferred: AtomicU64,
    failed: AtomicU64,
    cleaned_up: AtomicU64,
    by_collection: DashMap<String, u64>,
}

/// Moves staged uploads into a target entity's permanent collection.
pub struct MediaTransferService {
    temp_media: Arc<TempMediaService>,
    sweeper: ExpirySweeper,
    counters: TransferCounters,
}

/// A claimed record waiting to be attached
struct Candidate {
    position: usize,
    record: temp_media::Model,
}

impl MediaTransferService {
    pub fn new(temp_media: Arc<TempMediaService>) -> Self {
        let sweeper = ExpirySweeper::for_service(&temp_media);
        Self {
            temp_media,
            sweeper,
            counters: TransferCounters::default(),
        }
    }

    pub fn temp_media(&self) -> &Arc<TempMediaService> {
        &self.temp_media
    }

    /// Attach the requested uploads to `target` under `collection_name`.
    ///
    /// Partial success is normal: ids that are missing, expired, processed or
    /// claimed by a concurrent call end up in `failures`, as do ids whose
    /// attach failed. Only the ids that were attached become processed.
    #[tracing::instrument(
        skip(self, target, dto, custom_properties),
        fields(model_type = %target.media_model_type(), ids = dto.temp_media_ids.len())
    )]
    pub async fn transfer_temp_media_to_model(
        &self,
        target: &dyn HasMedia,
        dto: TempMediaTransferDto,
        collection_name: &str,
        custom_properties: CustomProperties,
    ) -> TempMediaResult<MediaTransferDto> {
        dto.validate()?;
        if collection_name.trim().is_empty() {
            return Err(TempMediaError::Validation(
                "Collection name must not be empty".to_string(),
            ));
        }

        let model_id = target.media_model_id();
        if model_id.is_empty() {
            return Err(TempMediaError::Target(format!(
                "{} must be persisted before media can be attached",
                target.media_model_type()
            )));
        }
        if !target.accepts_collection(collection_name) {
            return Err(TempMediaError::Target(format!(
                "{} {} does not accept collection '{}'",
                target.media_model_type(),
                model_id,
                collection_name
            )));
        }

        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let store = self.temp_media.store();
        let config = self.temp_media.config();
        let now = Utc::now();

        let resolved: HashMap<String, temp_media::Model> = store
            .find_active_many(&dto.temp_media_ids, now)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        if let Some(owner) = &dto.owner {
            if let Some(record) = resolved.values().find(|r| !owner.authorizes(&r.owner())) {
                tracing::warn!(temp_media_id = %record.id, "Transfer rejected: ownership mismatch");
                return Err(TempMediaError::Ownership);
            }
        }

        // Claim before attaching, so that only one caller ever attaches an id
        let claim_token = Uuid::new_v4().to_string();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut failures: Vec<(usize, TransferFailure)> = Vec::new();

        for (position, id) in dto.temp_media_ids.iter().enumerate() {
            let claimed = match resolved.get(id) {
                Some(record) => match store.claim(id, &claim_token, now).await {
                    Ok(true) => Some(record.clone()),
                    Ok(false) => None,
                    Err(e) => {
                        let held = candidates.iter().map(|c| c.record.id.as_str());
                        self.release_claims(held, &claim_token).await;
                        return Err(e.into());
                    }
                },
                None => None,
            };

            match claimed {
                Some(record) => candidates.push(Candidate { position, record }),
                None => failures.push((
                    position,
                    TransferFailure {
                        temp_media_id: id.clone(),
                        reason: FailureReason::NotFoundOrExpired,
                    },
                )),
            }
        }

        let results: Vec<Result<TransferredMedia, (usize, TransferFailure)>> =
            stream::iter(candidates)
                .map(|candidate| self.attach_one(target, &dto, collection_name, &custom_properties, candidate))
                .buffered(config.transfer_concurrency.max(1))
                .collect()
                .await;

        let mut transferred_media = Vec::new();
        for result in results {
            match result {
                Ok(media) => transferred_media.push(media),
                Err(failure) => failures.push(failure),
            }
        }

        let attach_failed: Vec<&str> = failures
            .iter()
            .filter(|(_, f)| matches!(f.reason, FailureReason::AttachFailed { .. }))
            .map(|(_, f)| f.temp_media_id.as_str())
            .collect();
        self.release_claims(attach_failed.into_iter(), &claim_token).await;

        let transferred_ids: Vec<String> = transferred_media
            .iter()
            .map(|m| m.temp_media_id.clone())
            .collect();
        // The media is attached by now. Failing here would hide the permanent
        // URLs; the rows keep this call's claim, so no retry attaches them again.
        if let Err(e) = self.temp_media.mark_as_processed(&transferred_ids).await {
            tracing::error!(
                ids = ?transferred_ids,
                "Attached temp media could not be marked processed: {}",
                e
            );
        }

        failures.sort_by_key(|(position, _)| *position);
        let result = MediaTransferDto {
            collection_name: collection_name.to_string(),
            transferred_count: transferred_media.len(),
            transferred_media,
            failures: failures.into_iter().map(|(_, f)| f).collect(),
        };

        self.record(&result);

        tracing::info!(
            model_id = %model_id,
            collection = %collection_name,
            transferred = result.transferred_count,
            failed = result.failed_count(),
            "Temporary media transfer finished"
        );

        notify(
            self.temp_media.notifications().as_ref(),
            TempMediaEvent::Transferred {
                target: target.target_ref(),
                transfer_dto: result.clone(),
            },
        );

        Ok(result)
    }

    async fn attach_one(
        &self,
        target: &dyn HasMedia,
        dto: &TempMediaTransferDto,
        collection_name: &str,
        custom_properties: &CustomProperties,
        candidate: Candidate,
    ) -> Result<TransferredMedia, (usize, TransferFailure)> {
        let Candidate { position, record } = candidate;
        let fail = |message: String| {
            tracing::warn!(temp_media_id = %record.id, "Attach failed: {}", message);
            (
                position,
                TransferFailure {
                    temp_media_id: record.id.clone(),
                    reason: FailureReason::AttachFailed { message },
                },
            )
        };

        let path = self
            .temp_media
            .staging()
            .resolve(&record.file_path)
            .map_err(|e| fail(e.to_string()))?;

        let per_id = dto.custom_properties.get(&record.id);
        let order = per_id
            .and_then(|p| p.get("order"))
            .and_then(|v| v.as_i64())
            .unwrap_or(position as i64 + 1);

        let mut properties = custom_properties.clone();
        if let Some(per_id) = per_id {
            properties.extend(per_id.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        properties.insert("order".to_string(), order.into());

        let attachment = MediaAttachment {
            temp_media_id: record.id.clone(),
            original_name: record.original_name.clone(),
            mime_type: record.mime_type.clone(),
            size_bytes: record.size_bytes,
            order,
            custom_properties: properties,
        };

        let attached = target
            .attach_media(collection_name, &path, attachment)
            .await
            .map_err(|e| fail(e.to_string()))?;

        Ok(TransferredMedia {
            id: attached.media_id,
            temp_media_id: record.id.clone(),
            url: attached.url,
            original_name: record.original_name.clone(),
            order,
        })
    }

    async fn release_claims<'a>(&self, ids: impl Iterator<Item = &'a str>, claim_token: &str) {
        for id in ids {
            if let Err(e) = self.temp_media.store().release_claim(id, claim_token).await {
                tracing::error!(temp_media_id = %id, "Failed to release transfer claim: {}", e);
            }
        }
    }

    fn record(&self, result: &MediaTransferDto) {
        self.counters
            .transferred
            .fetch_add(result.transferred_count as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(result.failed_count() as u64, Ordering::Relaxed);
        if result.transferred_count > 0 {
            *self
                .counters
                .by_collection
                .entry(result.collection_name.clone())
                .or_insert(0) += result.transferred_count as u64;
        }
    }

    /// True only if every id resolves to an active upload owned by the caller
    pub async fn validate_ownership(
        &self,
        temp_media_ids: &[String],
        session_id: Option<&str>,
        user_id: Option<&str>,
    ) -> TempMediaResult<bool> {
        let caller = OwnerToken::new(session_id.map(str::to_string), user_id.map(str::to_string));
        if temp_media_ids.is_empty() || caller.is_empty() {
            return Ok(false);
        }

        let wanted: HashSet<&String> = temp_media_ids.iter().collect();
        let records = self
            .temp_media
            .store()
            .find_active_many(temp_media_ids, Utc::now())
            .await?;

        Ok(records.len() == wanted.len() && records.iter().all(|r| caller.authorizes(&r.owner())))
    }

    /// Purge processed uploads past the retention period
    pub async fn cleanup_processed_temp_media(&self) -> TempMediaResult<u64> {
        let purged = self.sweeper.purge_processed().await?;
        self.counters.cleaned_up.fetch_add(purged, Ordering::Relaxed);
        if purged > 0 {
            tracing::info!(purged, "🧹 Processed temporary media cleaned up");
        }
        Ok(purged)
    }

    pub async fn get_transfer_stats(&self) -> TempMediaResult<TransferStats> {
        let store = self.temp_media.store();
        let by_collection: BTreeMap<String, u64> = self
            .counters
            .by_collection
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        Ok(TransferStats {
            total_requests: self.counters.requests.load(Ordering::Relaxed),
            total_transferred: self.counters.transferred.load(Ordering::Relaxed),
            total_failed: self.counters.failed.load(Ordering::Relaxed),
            total_cleaned_up: self.counters.cleaned_up.load(Ordering::Relaxed),
            by_collection,
            active_temp_media: store.count_with_status(TempMediaStatus::Active).await?,
            processed_temp_media: store.count_with_status(TempMediaStatus::Processed).await?,
        })
    }
}
