//! Runtime configuration loaded from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a `DEFAULT_*` constant and an env override. The config is
//! built once at startup and handed to the services that need it; nothing
//! reads the environment after construction.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
/// Per-transaction item limit of the document store.
pub const DEFAULT_STORE_BATCH_LIMIT: usize = 500;
pub const DEFAULT_BULK_ITEM_DELAY_MS: u64 = 50;
pub const DEFAULT_UPLOAD_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_UPLOAD_RETRY_BASE_MS: u64 = 500;
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MEDIA_DIR: &str = "./media";
pub const DEFAULT_MEDIA_BASE_URL: &str = "file://./media";

/// Tuning knobs for the store accessor and upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratorConfig {
    /// Postgres pool size.
    pub db_max_connections: u32,
    /// Maximum items written per store transaction.
    pub store_batch_limit: usize,
    /// Pause between sequential bulk writes, in milliseconds.
    pub bulk_item_delay_ms: u64,
    pub upload: UploadPolicy,
    /// Directory the local media store writes into.
    pub media_dir: PathBuf,
    /// URL prefix for files in `media_dir`.
    pub media_base_url: String,
}

/// Retry and timeout policy for a single media upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_attempts: u32,
    /// Delay before retry `n` is `retry_base_ms * n`.
    pub retry_base_ms: u64,
    /// Bound on one attempt, not on the whole retry loop.
    pub timeout_secs: u64,
}

impl UploadPolicy {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_UPLOAD_MAX_ATTEMPTS,
            retry_base_ms: DEFAULT_UPLOAD_RETRY_BASE_MS,
            timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
        }
    }
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            store_batch_limit: DEFAULT_STORE_BATCH_LIMIT,
            bulk_item_delay_ms: DEFAULT_BULK_ITEM_DELAY_MS,
            upload: UploadPolicy::default(),
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            media_base_url: DEFAULT_MEDIA_BASE_URL.to_owned(),
        }
    }
}

impl CuratorConfig {
    /// Build the config from environment variables.
    ///
    /// Optional:
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `STORE_BATCH_LIMIT`: default 500, clamped to at least 1
    /// - `BULK_ITEM_DELAY_MS`: default 50
    /// - `UPLOAD_MAX_ATTEMPTS`: default 3, clamped to at least 1
    /// - `UPLOAD_RETRY_BASE_MS`: default 500
    /// - `UPLOAD_TIMEOUT_SECS`: default 60
    /// - `MEDIA_DIR`, `MEDIA_BASE_URL`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            store_batch_limit: env_parse("STORE_BATCH_LIMIT", DEFAULT_STORE_BATCH_LIMIT).max(1),
            bulk_item_delay_ms: env_parse("BULK_ITEM_DELAY_MS", DEFAULT_BULK_ITEM_DELAY_MS),
            upload: UploadPolicy {
                max_attempts: env_parse("UPLOAD_MAX_ATTEMPTS", DEFAULT_UPLOAD_MAX_ATTEMPTS).max(1),
                retry_base_ms: env_parse("UPLOAD_RETRY_BASE_MS", DEFAULT_UPLOAD_RETRY_BASE_MS),
                timeout_secs: env_parse("UPLOAD_TIMEOUT_SECS", DEFAULT_UPLOAD_TIMEOUT_SECS),
            },
            media_dir: std::env::var("MEDIA_DIR").map_or_else(|_| PathBuf::from(DEFAULT_MEDIA_DIR), PathBuf::from),
            media_base_url: std::env::var("MEDIA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MEDIA_BASE_URL.to_owned())
                .trim_end_matches('/')
                .to_owned(),
        }
    }

    #[must_use]
    pub fn bulk_item_delay(&self) -> Duration {
        Duration::from_millis(self.bulk_item_delay_ms)
    }
}

pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
