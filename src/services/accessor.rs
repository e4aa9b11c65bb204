//! Template store accessor: reads, writes and change events.
//!
//! DESIGN
//! ======
//! `TemplateService` is the only path curation code uses to reach the
//! store. It owns the event bus and publishes after every successful write,
//! so subscribers never see an event for a write that did not land.
//! Bulk category updates are split into chunks no larger than the store's
//! per-transaction limit and committed one chunk at a time.
//!
//! ERROR HANDLING
//! ==============
//! Single writes return `StoreError` and let the caller decide whether to
//! roll back. Bulk writes never fail as a whole: every item gets its own
//! outcome in the report.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::CuratorConfig;
use crate::events::{EventBus, TemplateEvent};
use crate::store::{CategoryChange, CategoryUpdate, StoreError, TemplateStore};
use crate::template::{NewTemplate, TemplateRecord};

/// Separator of the playground's `"<categoryId>|||<templateId>"` keys.
pub const COMPOSITE_SEPARATOR: &str = "|||";

const ID_PREFIXES: [&str; 2] = ["template_", "template-"];

// =============================================================================
// TYPES
// =============================================================================

/// Result of one item in a bulk category update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<CategoryChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkUpdateReport {
    pub outcomes: Vec<UpdateOutcome>,
    /// Number of store transactions issued.
    pub chunks: usize,
}

impl BulkUpdateReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Clone)]
pub struct TemplateService {
    store: Arc<dyn TemplateStore>,
    events: EventBus,
    config: CuratorConfig,
}

impl TemplateService {
    #[must_use]
    pub fn new(store: Arc<dyn TemplateStore>, config: CuratorConfig) -> Self {
        Self { store, events: EventBus::new(), config }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// All templates. Cost grows linearly with the collection.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list(&self) -> Result<Vec<TemplateRecord>, StoreError> {
        self.store.list().await
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_by_category(&self, category: &str) -> Result<Vec<TemplateRecord>, StoreError> {
        self.store.list_by_category(category).await
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get(&self, id: &str) -> Result<Option<TemplateRecord>, StoreError> {
        self.store.get(id).await
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn audit_log(&self, id: &str) -> Result<Vec<CategoryChange>, StoreError> {
        self.store.audit_log(id).await
    }

    /// Reassign a template's category.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank category and `NotFound` when `id`
    /// does not resolve.
    pub async fn update_category(&self, id: &str, category: &str, actor: &str) -> Result<CategoryChange, StoreError> {
        let category = category.trim();
        if category.is_empty() {
            return Err(StoreError::Validation("category must not be empty".into()));
        }

        let change = self.store.update_category(id, category, actor).await?;
        info!(%id, previous = %change.previous, current = %change.current, %actor, "template category updated");
        self.events.publish(TemplateEvent::CategoryUpdated {
            id: change.template_id.clone(),
            previous: change.previous.clone(),
            current: change.current.clone(),
        });
        Ok(change)
    }

    /// Apply many category updates in chunks bounded by the store batch limit.
    ///
    /// Each chunk is committed before the next is sent. One item's failure
    /// never stops the others.
    pub async fn bulk_update_categories(&self, updates: Vec<CategoryUpdate>) -> BulkUpdateReport {
        let mut report = BulkUpdateReport::default();
        let mut valid = Vec::with_capacity(updates.len());

        for mut update in updates {
            update.category = update.category.trim().to_owned();
            if update.category.is_empty() {
                report.outcomes.push(UpdateOutcome {
                    id: update.id,
                    success: false,
                    error: Some(StoreError::Validation("category must not be empty".into()).to_string()),
                    change: None,
                });
            } else {
                valid.push(update);
            }
        }

        let limit = self.config.store_batch_limit.max(1);
        for (index, chunk) in valid.chunks(limit).enumerate() {
            if index > 0 && self.config.bulk_item_delay_ms > 0 {
                tokio::time::sleep(self.config.bulk_item_delay()).await;
            }

            let results = self.store.update_categories(chunk).await;
            report.chunks += 1;

            for (update, result) in chunk.iter().zip(results) {
                match result {
                    Ok(change) => {
                        self.events.publish(TemplateEvent::CategoryUpdated {
                            id: change.template_id.clone(),
                            previous: change.previous.clone(),
                            current: change.current.clone(),
                        });
                        report.outcomes.push(UpdateOutcome {
                            id: update.id.clone(),
                            success: true,
                            error: None,
                            change: Some(change),
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, id = %update.id, "bulk category update item failed");
                        report.outcomes.push(UpdateOutcome {
                            id: update.id.clone(),
                            success: false,
                            error: Some(e.to_string()),
                            change: None,
                        });
                    }
                }
            }
        }

        if report.succeeded() > 0 {
            self.events.publish(TemplateEvent::TemplatesUpdated);
        }
        info!(
            total = report.outcomes.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            chunks = report.chunks,
            "bulk category update finished"
        );
        report
    }

    /// Create a template.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when `title` or `category` is missing.
    pub async fn create(&self, new: NewTemplate) -> Result<TemplateRecord, StoreError> {
        let record = self.store.create(new).await?;
        info!(id = %record.id, title = %record.title, category = %record.category, "template created");
        self.events.publish(TemplateEvent::TemplateCreated { id: record.id.clone() });
        Ok(record)
    }

    /// Delete a template.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the id no longer exists. Callers that only
    /// care about local state treat that as done.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await?;
        info!(%id, "template deleted");
        self.events.publish(TemplateEvent::TemplateDeleted { id: id.to_owned() });
        Ok(())
    }

    /// Best-effort resolution of the store id for a locally held template.
    ///
    /// Tries the id as given, then its variants, then a title+category search.
    ///
    /// # Errors
    ///
    /// Propagates store failures from the lookups.
    pub async fn resolve_id(&self, id: &str, title: &str, category: &str) -> Result<Option<String>, StoreError> {
        self.resolve_id_excluding(id, title, category, &HashSet::new()).await
    }

    /// Like [`resolve_id`](Self::resolve_id), but a hit on any id in
    /// `claimed` counts as unresolved. Callers pass the ids of other cards
    /// still held locally so a lookup never lands on a live sibling.
    ///
    /// # Errors
    ///
    /// Propagates store failures from the lookups.
    pub async fn resolve_id_excluding(
        &self,
        id: &str,
        title: &str,
        category: &str,
        claimed: &HashSet<String>,
    ) -> Result<Option<String>, StoreError> {
        if !claimed.contains(id) && self.store.get(id).await?.is_some() {
            return Ok(Some(id.to_owned()));
        }

        for variant in id_variants(id) {
            if claimed.contains(&variant) {
                continue;
            }
            if self.store.get(&variant).await?.is_some() {
                return Ok(Some(variant));
            }
        }

        if title.trim().is_empty() {
            return Ok(None);
        }
        let found = self.store.find_by_title_category(title, category).await?;
        Ok(found.map(|r| r.id).filter(|found_id| !claimed.contains(found_id)))
    }
}

/// Alternative spellings of an id that local state may carry.
#[must_use]
pub fn id_variants(id: &str) -> Vec<String> {
    let mut variants: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        if !candidate.is_empty() && candidate != id && !variants.iter().any(|v| v == candidate) {
            variants.push(candidate.to_owned());
        }
    };

    let trimmed = id.trim();
    let base = trimmed
        .rsplit_once(COMPOSITE_SEPARATOR)
        .map_or(trimmed, |(_, tail)| tail.trim());
    push(trimmed);
    push(base);

    let lower = base.to_lowercase();
    push(&lower);
    for prefix in ID_PREFIXES {
        if let Some(stripped) = lower.strip_prefix(prefix) {
            push(stripped);
        }
        if let Some(stripped) = base.strip_prefix(prefix) {
            push(stripped);
        }
    }
    variants
}

#[cfg(test)]
#[path = "accessor_test.rs"]
mod tests;
