use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::config::TempMediaConfig;
use crate::entities::temp_media::{self, TempMediaStatus};
use crate::error::TempMediaResult;
use crate::services::notifications::{NotificationSink, TempMediaEvent, notify};
use crate::services::staging::StagingArea;
use crate::services::temp_media_service::TempMediaService;
use crate::services::temp_media_store::TempMediaStore;
use crate::utils::retry::with_retry;

/// Reclaims staged uploads that expired or were processed long enough ago.
///
/// Rows held by a live transfer claim are never selected. Every row delete
/// is conditional on the status the sweeper observed, so a concurrent
/// transfer and a purge cannot both win.
#[derive(Clone)]
pub struct ExpirySweeper {
    store: TempMediaStore,
    staging: Arc<dyn StagingArea>,
    notifications: Arc<dyn NotificationSink>,
    config: TempMediaConfig,
}

impl ExpirySweeper {
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

    /// Sweeper sharing the collaborators of an existing service
    pub fn for_service(service: &TempMediaService) -> Self {
        Self::new(
            service.store().clone(),
            service.staging().clone(),
            service.notifications().clone(),
            service.config().clone(),
        )
    }

    /// One full pass: expired uploads first, then processed ones past retention
    pub async fn sweep(&self) -> TempMediaResult<u64> {
        tracing::info!("🧹 Running temporary media sweep...");

        let expired = self.purge_expired().await?;
        let processed = self.purge_processed().await?;

        tracing::info!(
            expired,
            processed,
            "✅ Temporary media sweep completed"
        );
        Ok(expired + processed)
    }

    /// Purge rows that are expired, or active past their expiry
    pub async fn purge_expired(&self) -> TempMediaResult<u64> {
        let batch_size = self.config.sweep_batch_size.max(1);
        let mut purged = 0;

        loop {
            let now = Utc::now();
            let stale_before = now - self.config.claim_timeout();
            let batch = self.store.find_expired(now, stale_before, batch_size).await?;
            let fetched = batch.len() as u64;

            let mut progressed = 0;
            for row in batch {
                if self.purge_expired_row(row, now, stale_before).await? {
                    progressed += 1;
                }
            }
            purged += progressed;

            // rows that keep failing would otherwise be fetched forever
            if fetched < batch_size || progressed == 0 {
                break;
            }
        }

        Ok(purged)
    }

    /// Purge processed rows older than the retention period
    pub async fn purge_processed(&self) -> TempMediaResult<u64> {
        let batch_size = self.config.sweep_batch_size.max(1);
        let cutoff = Utc::now() - self.config.processed_retention();
        let mut purged = 0;

        loop {
            let batch = self.store.find_processed_before(cutoff, batch_size).await?;
            let fetched = batch.len() as u64;

            let mut progressed = 0;
            for row in batch {
                if self.purge_row(row, TempMediaStatus::Processed).await? {
                    progressed += 1;
                }
            }
            purged += progressed;

            if fetched < batch_size || progressed == 0 {
                break;
            }
        }

        Ok(purged)
    }

    async fn purge_expired_row(
        &self,
        mut row: temp_media::Model,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> TempMediaResult<bool> {
        if row.status == TempMediaStatus::Active {
            let store = &self.store;
            let id = row.id.as_str();
            let expired = with_retry("mark expired", self.config.io_retry_attempts, move || {
                store.mark_expired(id, now, stale_before)
            })
            .await?;

            if !expired {
                // claimed or processed since it was fetched
                tracing::debug!(temp_media_id = %row.id, "Skipping temp media that changed state");
                return Ok(false);
            }
            row.status = TempMediaStatus::Expired;
        }

        self.purge_row(row, TempMediaStatus::Expired).await
    }

    /// Delete the backing file then the row, if the row still has `status`
    async fn purge_row(&self, row: temp_media::Model, status: TempMediaStatus) -> TempMediaResult<bool> {
        let staging = self.staging.as_ref();
        let key = row.file_path.as_str();
        let removed = with_retry("staging delete", self.config.io_retry_attempts, move || {
            staging.delete(key)
        })
        .await;

        match removed {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                temp_media_id = %row.id,
                "Staged file already missing: {}",
                row.file_path
            ),
            Err(e) => {
                tracing::error!(temp_media_id = %row.id, "Failed to delete staged file: {}", e);
                return Ok(false);
            }
        }

        let store = &self.store;
        let id = row.id.as_str();
        let deleted = with_retry("purge row", self.config.io_retry_attempts, move || {
            store.delete_with_status(id, status)
        })
        .await?;

        if deleted {
            tracing::debug!(temp_media_id = %row.id, status = ?status, "Temp media purged");
            notify(
                self.notifications.as_ref(),
                TempMediaEvent::Expired { temp_media: row },
            );
        }
        Ok(deleted)
    }

    /// Sweep on the configured interval until `shutdown` flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.config.sweep_interval_secs,
            "🚀 Expiry sweeper started"
        );

        let mut ticker = interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("🛑 Expiry sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!("Temporary media sweep failed: {}", e);
                    }
                }
            }
        }
    }
}
