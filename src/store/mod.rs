//! Template store: the document collection behind every service.
//!
//! ARCHITECTURE
//! ============
//! `TemplateStore` is the seam between curation logic and the backing
//! collection. `PgTemplateStore` is the production implementation;
//! `MemoryTemplateStore` backs tests and offline runs against a JSON
//! snapshot. Services hold an `Arc<dyn TemplateStore>` and never know which
//! one they talk to.
//!
//! ERROR HANDLING
//! ==============
//! `NotFound` is a soft condition for callers that only want local state to
//! converge (deletes). Bulk updates report per-item results; a transport
//! failure inside a chunk fails every item of that chunk because nothing in
//! it was committed.

pub mod memory;
pub mod postgres;

use serde::{Deserialize, Serialize};

use crate::template::{NewTemplate, TemplateRecord};

pub use memory::MemoryTemplateStore;
pub use postgres::PgTemplateStore;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::error::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Validation(_) => "E_VALIDATION",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// One requested category reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub id: String,
    pub category: String,
    pub actor: String,
}

/// Audit entry written for every successful category reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryChange {
    pub template_id: String,
    pub previous: String,
    pub current: String,
    pub actor: String,
    /// Milliseconds since Unix epoch.
    pub at: i64,
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
    /// All records ordered by `created_at`, then `id`. No pagination.
    async fn list(&self) -> Result<Vec<TemplateRecord>, StoreError>;

    /// Records whose category field equals `category` exactly.
    async fn list_by_category(&self, category: &str) -> Result<Vec<TemplateRecord>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<TemplateRecord>, StoreError>;

    /// First record (oldest) whose title and category match case-insensitively.
    async fn find_by_title_category(&self, title: &str, category: &str)
    -> Result<Option<TemplateRecord>, StoreError>;

    /// Validate, strip absent fields, assign id and timestamps, and insert.
    async fn create(&self, new: NewTemplate) -> Result<TemplateRecord, StoreError>;

    /// Reassign one record's category and record the previous value.
    async fn update_category(&self, id: &str, category: &str, actor: &str) -> Result<CategoryChange, StoreError>;

    /// Apply one chunk of updates in a single transaction, one result per item.
    async fn update_categories(&self, chunk: &[CategoryUpdate]) -> Vec<Result<CategoryChange, StoreError>>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Category changes for a record, oldest first.
    async fn audit_log(&self, id: &str) -> Result<Vec<CategoryChange>, StoreError>;
}

/// Shared create-path validation: reject missing required fields, strip the rest.
///
/// # Errors
///
/// Returns `Validation` naming the first missing required field.
pub fn prepare_new(new: NewTemplate) -> Result<NewTemplate, StoreError> {
    let new = new.stripped();
    if let Some(field) = new.missing_required() {
        return Err(StoreError::Validation(format!("missing required field `{field}`")));
    }
    Ok(new)
}

// =============================================================================
// TEST HELPERS
// =============================================================================
