//! Template records and the label normalization shared by every service.
//!
//! DESIGN
//! ======
//! `TemplateRecord` mirrors one row of the `templates` table. `category` is
//! free text, so several spellings of the same logical category coexist
//! ("YouTube Video", "youtube-video"). Everything that compares categories
//! goes through [`normalize_label`] instead of comparing raw strings.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Label used when a record carries no usable category.
pub const UNCATEGORIZED: &str = "Uncategorized";

// =============================================================================
// RECORDS
// =============================================================================

/// A stored template. `id` is assigned by the store and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_score: Option<i64>,
    /// Milliseconds since Unix epoch.
    pub created_at: i64,
    /// Milliseconds since Unix epoch.
    pub last_modified: i64,
}

/// Create payload. The store assigns `id` and both timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_score: Option<i64>,
}

impl NewTemplate {
    #[must_use]
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self { title: title.into(), category: category.into(), ..Self::default() }
    }

    /// Name of the first required field that is missing or blank.
    #[must_use]
    pub fn missing_required(&self) -> Option<&'static str> {
        if self.title.trim().is_empty() {
            return Some("title");
        }
        if self.category.trim().is_empty() {
            return Some("category");
        }
        None
    }

    /// Trim required fields and drop optional fields that carry no value.
    ///
    /// The store rejects blank values, so `Some("")` is treated as absent.
    #[must_use]
    pub fn stripped(mut self) -> Self {
        self.title = self.title.trim().to_owned();
        self.category = self.category.trim().to_owned();
        self.description = non_blank(self.description);
        self.preview_url = non_blank(self.preview_url);
        self.video_source = non_blank(self.video_source);
        self.platform = non_blank(self.platform);
        self.quality = non_blank(self.quality);
        self.tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// Materialize into a stored record.
    #[must_use]
    pub fn into_record(self, id: String, now: i64) -> TemplateRecord {
        TemplateRecord {
            id,
            title: self.title,
            category: self.category,
            description: self.description,
            preview_url: self.preview_url,
            video_source: self.video_source,
            tags: self.tags,
            platform: self.platform,
            quality: self.quality,
            usage_score: self.usage_score,
            created_at: now,
            last_modified: now,
        }
    }
}

impl TemplateRecord {
    /// Case-insensitive `title|||category` key used to merge refreshed
    /// store data into local state.
    #[must_use]
    pub fn match_key(&self) -> String {
        format!("{}|||{}", self.title.trim().to_lowercase(), self.category.trim().to_lowercase())
    }

    /// Host of the preview URL, lower-cased. `None` when absent or unparsable.
    #[must_use]
    pub fn preview_domain(&self) -> Option<String> {
        self.preview_url.as_deref().and_then(url_host)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_owned()) }
    })
}

// =============================================================================
// LABELS
// =============================================================================

/// Lower-cased alphanumeric words of `raw`.
#[must_use]
pub fn words(raw: &str) -> Vec<String> {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Canonical form of a category label for comparison.
///
/// "YouTube Videos", "youtube-video" and " YOUTUBE_VIDEO " all normalize to
/// `"youtube video"`. Trailing plural `s` is dropped on words longer than
/// three characters.
#[must_use]
pub fn normalize_label(raw: &str) -> String {
    words(raw)
        .into_iter()
        .map(|w| singular(&w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn singular(word: &str) -> String {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_owned()
    } else {
        word.to_owned()
    }
}

/// URL-safe identifier for a label: `"YouTube Video"` → `"youtube-video"`.
#[must_use]
pub fn slugify(raw: &str) -> String {
    let slug = normalize_label(raw).replace(' ', "-");
    if slug.is_empty() { "uncategorized".to_owned() } else { slug }
}

/// Lower-cased host of a URL string.
#[must_use]
pub fn url_host(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    parsed.host_str().map(str::to_lowercase)
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Current UTC time as an RFC 3339 string, for exported files.
#[must_use]
pub fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    now.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
#[path = "template_test.rs"]
mod tests;
