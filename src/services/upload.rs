//! Media upload pipeline.
//!
//! DESIGN
//! ======
//! Files are uploaded one at a time. Each attempt runs under the policy's
//! timeout; a retryable failure waits `retry_base_ms × attempt` and tries
//! again until `max_attempts` is reached. One file's failure never affects
//! the next.
//!
//! The timeout is per attempt and a timed-out attempt is retryable, so one
//! stalled file can hold the pipeline for at most
//!
//! ```text
//! max_attempts × timeout_secs + retry_base_ms × (1 + 2 + … + (max_attempts − 1))
//! ```
//!
//! `MediaUploader` is the seam for the media backend. `LocalMediaStore`
//! copies files into a directory and returns a URL under a configured
//! prefix; tests substitute their own uploader.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{CuratorConfig, UploadPolicy};
use crate::error::ErrorCode;
use crate::template::{NewTemplate, slugify};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "avif", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi", "m4v"];

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unsupported media type: {0}")]
    UnsupportedType(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {name} timed out after {secs}s")]
    Timeout { name: String, secs: u64 },
    #[error("upload rejected: {0}")]
    Rejected(String),
}

impl ErrorCode for UploadError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "E_UNSUPPORTED_MEDIA",
            Self::Io { .. } => "E_UPLOAD_IO",
            Self::Timeout { .. } => "E_UPLOAD_TIMEOUT",
            Self::Rejected(_) => "E_UPLOAD_REJECTED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Timeout { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// A local file accepted for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// File name without directories.
    pub name: String,
    pub kind: MediaKind,
}

impl MediaFile {
    /// Accept `path` if its extension is a known image or video type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` for any other extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(MediaKind::from_extension)
            .ok_or_else(|| UploadError::UnsupportedType(name.clone()))?;
        Ok(Self { path: path.to_path_buf(), name, kind })
    }

    /// Human title derived from the file stem: `"summer_sale-v2.png"` → `"summer sale v2"`.
    #[must_use]
    pub fn title(&self) -> String {
        let stem = self.path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        stem.split(['_', '-', '.', ' '])
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub name: String,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    title: String,
}

impl UploadOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.url.is_some()
    }
}

// =============================================================================
// UPLOADERS
// =============================================================================

#[async_trait::async_trait]
pub trait MediaUploader: Send + Sync {
    /// Store one file and return its public URL.
    async fn upload(&self, file: &MediaFile) -> Result<String, UploadError>;
}

/// Copies media into a local directory.
pub struct LocalMediaStore {
    dir: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self { dir: dir.into(), base_url: base_url.trim_end_matches('/').to_owned() }
    }

    #[must_use]
    pub fn from_config(config: &CuratorConfig) -> Self {
        Self::new(config.media_dir.clone(), config.media_base_url.clone())
    }
}

#[async_trait::async_trait]
impl MediaUploader for LocalMediaStore {
    async fn upload(&self, file: &MediaFile) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| UploadError::Io { path: self.dir.clone(), source })?;

        let prefix = uuid::Uuid::new_v4().simple().to_string();
        let stored_name = format!("{}-{}", &prefix[..8], file.name.replace(' ', "_"));
        let dest = self.dir.join(&stored_name);
        tokio::fs::copy(&file.path, &dest)
            .await
            .map_err(|source| UploadError::Io { path: file.path.clone(), source })?;

        Ok(format!("{}/{stored_name}", self.base_url))
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Upload `files` sequentially under `policy`.
///
/// Every attempt gets a fresh `policy.timeout()`; there is no overall
/// deadline per file beyond `max_attempts` of them.
pub async fn upload_all(uploader: &dyn MediaUploader, files: &[MediaFile], policy: &UploadPolicy) -> Vec<UploadOutcome> {
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        outcomes.push(upload_with_retry(uploader, file, policy).await);
    }
    let uploaded = outcomes.iter().filter(|o| o.success()).count();
    info!(uploaded, failed = outcomes.len() - uploaded, "media upload finished");
    outcomes
}

async fn upload_with_retry(uploader: &dyn MediaUploader, file: &MediaFile, policy: &UploadPolicy) -> UploadOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut outcome = UploadOutcome {
        name: file.name.clone(),
        kind: file.kind,
        url: None,
        attempts: 0,
        error: None,
        title: file.title(),
    };

    for attempt in 1..=max_attempts {
        outcome.attempts = attempt;
        let result = match timeout(policy.timeout(), uploader.upload(file)).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::Timeout { name: file.name.clone(), secs: policy.timeout_secs }),
        };

        match result {
            Ok(url) => {
                info!(name = %file.name, %url, attempt, "media uploaded");
                outcome.url = Some(url);
                outcome.error = None;
                return outcome;
            }
            Err(e) if attempt < max_attempts && e.retryable() => {
                warn!(error = %e, name = %file.name, attempt, total = max_attempts, "media upload failed; retrying");
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), name = %file.name, attempt, "media upload failed");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        }
    }
    outcome
}

/// Create payloads for the successful uploads in `outcomes`.
///
/// Images become the preview, videos the video source.
#[must_use]
pub fn templates_from_uploads(outcomes: &[UploadOutcome], category: &str) -> Vec<NewTemplate> {
    outcomes
        .iter()
        .filter_map(|o| {
            let url = o.url.clone()?;
            let title = if o.title.is_empty() { o.name.clone() } else { o.title.clone() };
            let mut new = NewTemplate::new(title.clone(), category);
            new.description = Some(title);
            new.tags = vec![slugify(category)];
            match o.kind {
                MediaKind::Image => new.preview_url = Some(url),
                MediaKind::Video => new.video_source = Some(url),
            }
            Some(new)
        })
        .collect()
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod tests;
