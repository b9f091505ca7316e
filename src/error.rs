use thiserror::Error;

use crate::services::staging::StagingError;

#[derive(Error, Debug)]
pub enum TempMediaError {
    /// Bad input shape, disallowed mime type or size
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backing file or row I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Ownership check failed for temporary media")]
    Ownership,

    /// Target entity cannot accept media
    #[error("Target error: {0}")]
    Target(String),
}

impl From<sea_orm::DbErr> for TempMediaError {
    fn from(e: sea_orm::DbErr) -> Self {
        tracing::error!("Database error: {:?}", e);
        TempMediaError::Storage(e.to_string())
    }
}

impl From<StagingError> for TempMediaError {
    fn from(e: StagingError) -> Self {
        TempMediaError::Storage(e.to_string())
    }
}

impl From<validator::ValidationErrors> for TempMediaError {
    fn from(e: validator::ValidationErrors) -> Self {
        TempMediaError::Validation(e.to_string())
    }
}

pub type TempMediaResult<T> = Result<T, TempMediaError>;
