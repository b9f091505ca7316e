pub mod config;
pub mod entities;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::TempMediaConfig;
use crate::services::expiry_sweeper::ExpirySweeper;
use crate::services::notifications::NotificationSink;
use crate::services::staging::StagingArea;
use crate::services::temp_media_service::TempMediaService;
use crate::services::temp_media_store::TempMediaStore;
use crate::services::transfer_service::MediaTransferService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub use crate::error::{TempMediaError, TempMediaResult};
pub use crate::services::handles_temp_media::HandlesTempMedia;
pub use crate::services::media_library::HasMedia;

/// The staging service, transfer engine and sweeper, wired to one set of
/// collaborators. Build once and hold it for the life of the host.
#[derive(Clone)]
pub struct TempMediaServices {
    pub temp_media: Arc<TempMediaService>,
    pub transfer: Arc<MediaTransferService>,
    pub sweeper: ExpirySweeper,
}

impl TempMediaServices {
    pub fn new(
        db: DatabaseConnection,
        staging: Arc<dyn StagingArea>,
        notifications: Arc<dyn NotificationSink>,
        config: TempMediaConfig,
    ) -> Self {
        let temp_media = Arc::new(TempMediaService::new(
            TempMediaStore::new(db),
            staging,
            notifications,
            config,
        ));
        let transfer = Arc::new(MediaTransferService::new(temp_media.clone()));
        let sweeper = ExpirySweeper::for_service(&temp_media);

        Self {
            temp_media,
            transfer,
            sweeper,
        }
    }
}
