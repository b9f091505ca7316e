use crate::config::TempMediaConfig;
use crate::services::staging::{LocalStagingArea, StagingResult};
use std::sync::Arc;
use tracing::info;

pub async fn setup_staging(config: &TempMediaConfig) -> StagingResult<Arc<LocalStagingArea>> {
    info!(
        "📁 Staging area: {} (preview: {})",
        config.staging_dir.display(),
        config.staging_base_url
    );

    let staging = LocalStagingArea::new(&config.staging_dir, &config.staging_base_url).await?;
    Ok(Arc::new(staging))
}
