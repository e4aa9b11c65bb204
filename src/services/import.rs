//! JSON template import.
//!
//! DESIGN
//! ======
//! Import files come from older exports and hand-edited lists, so the parser
//! is lenient about shape and field names:
//!
//! ```text
//! [ {...}, ... ]              plain array
//! { "templates": [ ... ] }    wrapped
//! { "data": [ ... ] }         wrapped
//! { ... }                     single template
//! ```
//!
//! Each accepted item becomes a `NewTemplate`. Before creating it, the
//! importer computes the same signature the duplicate detector uses and
//! skips items that match an existing record or an earlier item in the file.
//!
//! ERROR HANDLING
//! ==============
//! A malformed file fails the whole import before anything is written. After
//! that, failures are per item and collected into the report.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::ErrorCode as _;
use crate::events::TemplateEvent;
use crate::services::accessor::TemplateService;
use crate::services::duplicates::signature;
use crate::store::StoreError;
use crate::template::{NewTemplate, TemplateRecord, UNCATEGORIZED, slugify};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported import shape: {0}")]
    Shape(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl crate::error::ErrorCode for ImportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "E_IMPORT_JSON",
            Self::Shape(_) => "E_IMPORT_SHAPE",
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.retryable(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DuplicateDetected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedImport {
    /// Position in the input list.
    pub index: usize,
    pub title: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub index: usize,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: Vec<TemplateRecord>,
    pub skipped: Vec<SkippedImport>,
    pub errors: Vec<ImportFailure>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse an import document into create payloads.
///
/// # Errors
///
/// Returns `Json` for invalid JSON and `Shape` when the document or one of
/// its items is not an object.
pub fn parse_templates(json: &str) -> Result<Vec<NewTemplate>, ImportError> {
    let root: Value = serde_json::from_str(json)?;
    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("templates").or_else(|| obj.remove("data")) {
            Some(Value::Array(items)) => items,
            Some(other) => return Err(ImportError::Shape(format!("expected a list, found {}", kind(&other)))),
            None => vec![Value::Object(obj)],
        },
        other => return Err(ImportError::Shape(format!("expected a list or object, found {}", kind(&other)))),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(obj) => Ok(template_from_object(&obj)),
            other => Err(ImportError::Shape(format!("item {index} is {}, not an object", kind(&other)))),
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn template_from_object(obj: &Map<String, Value>) -> NewTemplate {
    let title = text(obj, &["title", "name"]).unwrap_or_default();
    let category = text(obj, &["category", "type"]).unwrap_or_else(|| UNCATEGORIZED.to_owned());
    let description = text(obj, &["description", "desc"]).or_else(|| (!title.is_empty()).then(|| title.clone()));

    let mut tags = tag_list(obj.get("tags"));
    if tags.is_empty() {
        tags.push(slugify(&category));
    }

    NewTemplate {
        description,
        preview_url: text(obj, &["preview_url", "preview", "thumbnail"]),
        video_source: text(obj, &["video_source", "video", "videoUrl"]),
        tags,
        platform: text(obj, &["platform"]),
        quality: text(obj, &["quality"]),
        usage_score: number(obj, &["usage_score", "usageCount"]),
        title,
        category,
    }
}

/// First non-blank string among `keys`.
fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    })
}

fn number(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Tags as a list of strings or one comma-separated string.
fn tag_list(value: Option<&Value>) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_owned).collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_owned).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect()
}

// =============================================================================
// IMPORT
// =============================================================================

/// Create every new template in `json`, skipping duplicates.
///
/// # Errors
///
/// Fails before any write when the document does not parse or the existing
/// records cannot be listed.
pub async fn import_templates(service: &TemplateService, json: &str) -> Result<ImportReport, ImportError> {
    let candidates = parse_templates(json)?;
    let existing = service.list().await?;
    let mut seen: HashSet<String> = existing.iter().map(signature).collect();
    let mut report = ImportReport::default();
    let delay = service.config().bulk_item_delay();
    let mut writes = 0usize;

    for (index, candidate) in candidates.into_iter().enumerate() {
        let candidate = candidate.stripped();
        if let Some(field) = candidate.missing_required() {
            report.errors.push(ImportFailure {
                index,
                title: candidate.title.clone(),
                error: format!("missing required field `{field}`"),
            });
            continue;
        }

        let as_record = candidate.clone().into_record(String::new(), 0);
        if !seen.insert(signature(&as_record)) {
            warn!(index, title = %candidate.title, "import skipped duplicate");
            report.skipped.push(SkippedImport { index, title: candidate.title, reason: SkipReason::DuplicateDetected });
            continue;
        }

        if writes > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        writes += 1;

        let title = candidate.title.clone();
        match service.create(candidate).await {
            Ok(record) => report.imported.push(record),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), index, "import item failed");
                report.errors.push(ImportFailure { index, title, error: e.to_string() });
            }
        }
    }

    if !report.imported.is_empty() {
        service.events().publish(TemplateEvent::TemplatesImported { count: report.imported.len() });
    }
    info!(
        imported = report.imported.len(),
        skipped = report.skipped.len(),
        failed = report.errors.len(),
        "template import finished"
    );
    Ok(report)
}

#[cfg(test)]
#[path = "import_test.rs"]
mod tests;
