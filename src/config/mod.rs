use std::env;
use std::path::PathBuf;

use crate::utils::validation::ValidationRules;

/// Default lifetime of a staged upload
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Upper bound accepted for a per-upload TTL override (30 days)
pub const MAX_TTL_HOURS: i64 = 720;

/// Longest claim timeout honoured (7 days)
pub const MAX_CLAIM_TIMEOUT_SECS: i64 = 7 * 24 * 3600;

/// Longest processed retention honoured (1 year)
pub const MAX_PROCESSED_RETENTION_HOURS: i64 = 365 * 24;

/// Configuration for temporary media staging and transfer
#[derive(Debug, Clone)]
pub struct TempMediaConfig {
    /// Lifetime of a staged upload in hours (default: 24)
    pub default_ttl_hours: i64,

    /// How long processed records are kept for audit before purge (default: 1)
    pub processed_retention_hours: i64,

    /// Maximum upload size in bytes (default: 10 MB)
    pub max_file_size: usize,

    /// Allowed MIME types. Empty means any type is accepted.
    pub allowed_mime_types: Vec<String>,

    /// Root directory of the staging area (default: "storage/temp-media")
    pub staging_dir: PathBuf,

    /// Public base URL used for staging previews
    pub staging_base_url: String,

    /// Sweeper interval in seconds when running in watch mode (default: 3600)
    pub sweep_interval_secs: u64,

    /// Rows fetched per sweeper batch (default: 500)
    pub sweep_batch_size: u64,

    /// Parallel attach operations per transfer call (default: 4)
    pub transfer_concurrency: usize,

    /// Age after which a transfer claim no longer shields the row from cleanup (default: 300)
    pub claim_timeout_secs: i64,

    /// Attempts for file deletes and status updates (default: 3)
    pub io_retry_attempts: u32,
}

impl Default for TempMediaConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: DEFAULT_TTL_HOURS,
            processed_retention_hours: 1,
            max_file_size: 10 * 1024 * 1024, // 10 MB
            allowed_mime_types: default_mime_types(),
            staging_dir: PathBuf::from("storage/temp-media"),
            staging_base_url: "http://localhost:3000/temp-media".to_string(),
            sweep_interval_secs: 3600,
            sweep_batch_size: 500,
            transfer_concurrency: 4,
            claim_timeout_secs: 300,
            io_retry_attempts: 3,
        }
    }
}

fn default_mime_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/avif",
        "application/pdf",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl TempMediaConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            default_ttl_hours: parse_env("TEMP_MEDIA_TTL_HOURS", default.default_ttl_hours),

            processed_retention_hours: parse_env(
                "TEMP_MEDIA_PROCESSED_RETENTION_HOURS",
                default.processed_retention_hours,
            ),

            max_file_size: parse_env("TEMP_MEDIA_MAX_FILE_SIZE", default.max_file_size),

            allowed_mime_types: env::var("TEMP_MEDIA_ALLOWED_MIME_TYPES")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_mime_types),

            staging_dir: env::var("TEMP_MEDIA_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            staging_base_url: env::var("TEMP_MEDIA_STAGING_URL")
                .unwrap_or(default.staging_base_url),

            sweep_interval_secs: parse_env(
                "TEMP_MEDIA_SWEEP_INTERVAL_SECS",
                default.sweep_interval_secs,
            ),

            sweep_batch_size: parse_env("TEMP_MEDIA_SWEEP_BATCH_SIZE", default.sweep_batch_size),

            transfer_concurrency: parse_env(
                "TEMP_MEDIA_TRANSFER_CONCURRENCY",
                default.transfer_concurrency,
            ),

            claim_timeout_secs: parse_env(
                "TEMP_MEDIA_CLAIM_TIMEOUT_SECS",
                default.claim_timeout_secs,
            ),

            io_retry_attempts: parse_env(
                "TEMP_MEDIA_IO_RETRY_ATTEMPTS",
                default.io_retry_attempts,
            ),
        }
    }

    /// Create config for development (any mime type, short retention)
    pub fn development() -> Self {
        Self {
            processed_retention_hours: 0,
            max_file_size: 50 * 1024 * 1024,
            allowed_mime_types: Vec::new(),
            sweep_interval_secs: 300,
            ..Self::default()
        }
    }

    /// Create config for production (strict mime list, staging dir required)
    pub fn production() -> Self {
        let from_env = Self::from_env();
        Self {
            staging_dir: env::var("TEMP_MEDIA_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/temp-media")),
            processed_retention_hours: from_env.processed_retention_hours.max(1),
            ..from_env
        }
    }

    /// Rules applied to every incoming upload
    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            allowed_mimes: self.allowed_mime_types.clone(),
            max_file_size: self.max_file_size,
        }
    }

    /// Claim timeout, clamped to `0..=MAX_CLAIM_TIMEOUT_SECS`
    pub fn claim_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_timeout_secs.clamp(0, MAX_CLAIM_TIMEOUT_SECS))
    }

    /// Processed retention, clamped to `0..=MAX_PROCESSED_RETENTION_HOURS`
    pub fn processed_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.processed_retention_hours
                .clamp(0, MAX_PROCESSED_RETENTION_HOURS),
        )
    }
}
