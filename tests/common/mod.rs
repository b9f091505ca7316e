#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use temp_media::TempMediaServices;
use temp_media::config::TempMediaConfig;
use temp_media::entities::{prelude::*, temp_media as temp_media_entity};
use temp_media::infrastructure::database;
use temp_media::models::{OwnerToken, TempMediaUploadDto, UploadedFile};
use temp_media::services::media_library::{AttachError, AttachedMedia, HasMedia, MediaAttachment};
use temp_media::services::notifications::{ChannelNotificationSink, TempMediaEvent};
use temp_media::services::staging::LocalStagingArea;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

pub const PNG_BYTES: [u8; 16] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("temp_media=debug"))
        .with_test_writer()
        .try_init();
}

pub async fn setup_test_db() -> DatabaseConnection {
    // one connection, so every query sees the same in-memory database
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub fn test_config() -> TempMediaConfig {
    TempMediaConfig {
        processed_retention_hours: 0,
        io_retry_attempts: 1,
        ..TempMediaConfig::default()
    }
}

pub struct TestContext {
    pub dir: TempDir,
    pub db: DatabaseConnection,
    pub services: TempMediaServices,
    pub staging: Arc<LocalStagingArea>,
    pub events: UnboundedReceiver<TempMediaEvent>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(mut config: TempMediaConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        config.staging_dir = dir.path().join("staging");
        config.staging_base_url = "http://localhost/tmp".to_string();

        let db = setup_test_db().await;
        let staging = Arc::new(
            LocalStagingArea::new(&config.staging_dir, &config.staging_base_url)
                .await
                .unwrap(),
        );
        let (sink, events) = ChannelNotificationSink::channel();
        let services = TempMediaServices::new(db.clone(), staging.clone(), Arc::new(sink), config);

        Self {
            dir,
            db,
            services,
            staging,
            events,
        }
    }

    pub async fn upload_png(&self, name: &str, owner: OwnerToken) -> TempMediaUploadDto {
        self.services
            .temp_media
            .upload_temp_media(UploadedFile::new(name, Some("image/png"), PNG_BYTES.to_vec()), owner, None)
            .await
            .unwrap()
    }

    pub async fn row(&self, id: &str) -> Option<temp_media_entity::Model> {
        TempMedia::find_by_id(id.to_string()).one(&self.db).await.unwrap()
    }

    pub async fn staged_file_exists(&self, id: &str) -> bool {
        match self.row(id).await {
            Some(row) => self.staging.base_path().join(row.file_path).exists(),
            None => false,
        }
    }

    pub fn staged_file_count(&self) -> usize {
        std::fs::read_dir(self.staging.base_path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Push a record's expiry into the past
    pub async fn force_expire(&self, id: &str) {
        let row = self.row(id).await.unwrap();
        let mut active: temp_media_entity::ActiveModel = row.into();
        active.expires_at = Set(Utc::now() - Duration::hours(1));
        active.update(&self.db).await.unwrap();
    }

    pub fn drain_events(&mut self) -> Vec<TempMediaEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

#[derive(Debug, Clone)]
pub struct RecordedAttachment {
    pub collection: String,
    pub attachment: MediaAttachment,
}

/// In-memory media target recording every attach
pub struct MockTarget {
    pub model_id: String,
    pub collections: Option<Vec<String>>,
    pub fail_ids: HashSet<String>,
    pub delay_ms: u64,
    pub attached: Mutex<Vec<RecordedAttachment>>,
}

impl MockTarget {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            collections: None,
            fail_ids: HashSet::new(),
            delay_ms: 0,
            attached: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, ids: &[&str]) -> Self {
        self.fail_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_collections(mut self, collections: &[&str]) -> Self {
        self.collections = Some(collections.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn attached(&self) -> Vec<RecordedAttachment> {
        self.attached.lock().unwrap().clone()
    }
}

#[async_trait]
impl HasMedia for MockTarget {
    fn media_model_type(&self) -> &str {
        "product"
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
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if !tokio::fs::try_exists(file_path).await? {
            return Err(AttachError::SourceMissing(file_path.display().to_string()));
        }
        if self.fail_ids.contains(&attachment.temp_media_id) {
            return Err(AttachError::Backend("simulated failure".to_string()));
        }

        let mut attached = self.attached.lock().unwrap();
        let media_id = format!("media-{}", attached.len() + 1);
        let url = format!(
            "https://cdn.test/{}/{}/{}",
            self.model_id, collection_name, attachment.original_name
        );
        attached.push(RecordedAttachment {
            collection: collection_name.to_string(),
            attachment,
        });

        Ok(AttachedMedia { media_id, url })
    }
}
