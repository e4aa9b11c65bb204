//! Playground reconciler for the editable, in-memory set of category groups.
//!
//! DESIGN
//! ======
//! The playground is a projection of the last successful load plus any
//! optimistic local edits not yet confirmed failed. A drag goes through
//!
//! ```text
//! idle → dragging → persisting → idle
//!                        └→ error-rollback → idle
//! ```
//!
//! A cross-group drop mutates local state synchronously, queues the success
//! toast, and records a `MoveTicket` (the undo entry) before the store write
//! starts. Confirmation discards the ticket; failure replays it in reverse so
//! local state returns to exactly what it was before the drop.
//!
//! Same-group reorders are local only: the store has no ordering field, so
//! there is nothing to persist.
//!
//! TRADE-OFFS
//! ==========
//! Single delete rolls local state back on an unexpected store error. Bulk
//! delete does not: every selected template leaves the view and failures are
//! logged and reported per item.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::{info, warn};

use crate::services::accessor::{COMPOSITE_SEPARATOR, TemplateService};
use crate::services::catalog::{CategoryCatalog, CategoryGroup};
use crate::store::CategoryChange;
use crate::template::{TemplateRecord, now_rfc3339, slugify};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PlaygroundError {
    #[error("unknown playground key: {0}")]
    UnknownKey(String),
    #[error("no pending move for template {0}")]
    NoPendingMove(String),
}

impl crate::error::ErrorCode for PlaygroundError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownKey(_) => "E_UNKNOWN_KEY",
            Self::NoPendingMove(_) => "E_NO_PENDING_MOVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Dragging,
    Persisting,
    ErrorRollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

/// Transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

/// Where a dragged card was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub category_id: String,
    /// Final position in the target list.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DragSource {
    group_id: String,
    template_id: String,
}

/// Undo entry for an optimistic cross-group move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveTicket {
    pub template_id: String,
    pub title: String,
    pub from_group: String,
    pub from_label: String,
    pub from_index: usize,
    pub to_group: String,
    /// Category value before the move.
    pub previous_category: String,
    /// Category value written by the move (the target group's label).
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    NoOp,
    Reordered { group_id: String, from: usize, to: usize },
    Pending(MoveTicket),
}

/// Structured result of a full drag-and-drop move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// The key did not resolve; the drag never started.
    Aborted,
    NoOp,
    Reordered,
    Persisted { change: CategoryChange },
    RolledBack { error: String },
}

impl MoveOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        !matches!(self, Self::Aborted | Self::RolledBack { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub template_id: String,
    pub success: bool,
    /// The store document was found and deleted.
    pub store_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkDeleteReport {
    /// Template ids removed from local state.
    pub removed: Vec<String>,
    pub store_deleted: usize,
    pub store_failures: Vec<StoreFailure>,
    pub unknown_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreFailure {
    pub id: String,
    pub error: String,
}

/// Snapshot of a locally removed card, enough to put it back.
struct Removed {
    group_id: String,
    label: String,
    index: usize,
    record: TemplateRecord,
}

/// Build a `"<categoryId>|||<templateId>"` key.
#[must_use]
pub fn composite_key(category_id: &str, template_id: &str) -> String {
    format!("{category_id}{COMPOSITE_SEPARATOR}{template_id}")
}

/// Split a composite key. Both halves must be non-empty.
#[must_use]
pub fn parse_key(key: &str) -> Option<(&str, &str)> {
    let (category_id, template_id) = key.split_once(COMPOSITE_SEPARATOR)?;
    if category_id.is_empty() || template_id.is_empty() {
        return None;
    }
    Some((category_id, template_id))
}

// =============================================================================
// PLAYGROUND
// =============================================================================

pub struct Playground {
    catalog: CategoryCatalog,
    groups: Vec<CategoryGroup>,
    phase: Phase,
    drag: Option<DragSource>,
    pending: Option<MoveTicket>,
    toasts: VecDeque<Toast>,
}

impl Playground {
    #[must_use]
    pub fn new(catalog: CategoryCatalog) -> Self {
        Self {
            catalog,
            groups: Vec::new(),
            phase: Phase::Idle,
            drag: None,
            pending: None,
            toasts: VecDeque::new(),
        }
    }

    /// Replace local state with a fresh partition of `records`.
    pub fn load(&mut self, records: &[TemplateRecord]) {
        self.groups = self.catalog.group(records);
        self.phase = Phase::Idle;
        self.drag = None;
        self.pending = None;
        info!(groups = self.groups.len(), templates = records.len(), "playground loaded");
    }

    /// Drop all local state.
    pub fn reset(&mut self) {
        self.groups.clear();
        self.phase = Phase::Idle;
        self.drag = None;
        self.pending = None;
        self.toasts.clear();
    }

    /// Load from the store.
    ///
    /// # Errors
    ///
    /// Propagates store failures; local state is untouched on error.
    pub async fn load_from(&mut self, service: &TemplateService) -> Result<(), crate::store::StoreError> {
        let records = service.list().await?;
        self.load(&records);
        Ok(())
    }

    #[must_use]
    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn groups(&self) -> &[CategoryGroup] {
        &self.groups
    }

    #[must_use]
    pub fn group(&self, id: &str) -> Option<&CategoryGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn pending(&self) -> Option<&MoveTicket> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn total_templates(&self) -> usize {
        self.groups.iter().map(|g| g.templates.len()).sum()
    }

    pub fn drain_toasts(&mut self) -> Vec<Toast> {
        self.toasts.drain(..).collect()
    }

    /// Collapse or expand a group. Returns `false` for an unknown id.
    pub fn set_expanded(&mut self, group_id: &str, expanded: bool) -> bool {
        match self.groups.iter_mut().find(|g| g.id == group_id) {
            Some(group) => {
                group.expanded = expanded;
                true
            }
            None => false,
        }
    }

    fn locate(&self, key: &str) -> Option<(usize, usize)> {
        let (group_id, template_id) = parse_key(key)?;
        let group_index = self.groups.iter().position(|g| g.id == group_id)?;
        let index = self.groups[group_index].position(template_id)?;
        Some((group_index, index))
    }

    fn toast(&mut self, kind: ToastKind, message: String) {
        self.toasts.push_back(Toast { kind, message });
    }

    // -------------------------------------------------------------------------
    // DRAG AND DROP
    // -------------------------------------------------------------------------

    /// `idle → dragging`. Returns `false` (and stays put) when a drag or
    /// write is already in flight or either half of the key does not resolve.
    pub fn begin_drag(&mut self, key: &str) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        let Some((group_index, index)) = self.locate(key) else {
            return false;
        };
        let group = &self.groups[group_index];
        self.drag = Some(DragSource { group_id: group.id.clone(), template_id: group.templates[index].id.clone() });
        self.phase = Phase::Dragging;
        true
    }

    /// `dragging → idle` without changes.
    pub fn cancel_drag(&mut self) {
        if self.phase == Phase::Dragging {
            self.drag = None;
            self.phase = Phase::Idle;
        }
    }

    /// Release the dragged card.
    ///
    /// No target, an unknown target or a same-position drop is a no-op. A
    /// same-group drop reorders locally. A cross-group drop is applied
    /// optimistically and returns the ticket the caller must complete.
    pub fn drop_on(&mut self, target: Option<DropTarget>) -> DropOutcome {
        if self.phase != Phase::Dragging {
            return DropOutcome::NoOp;
        }
        self.phase = Phase::Idle;
        let Some(source) = self.drag.take() else {
            return DropOutcome::NoOp;
        };
        let Some(target) = target else {
            return DropOutcome::NoOp;
        };

        let Some(from_group) = self.groups.iter().position(|g| g.id == source.group_id) else {
            return DropOutcome::NoOp;
        };
        let Some(from_index) = self.groups[from_group].position(&source.template_id) else {
            return DropOutcome::NoOp;
        };
        let Some(to_group) = self.groups.iter().position(|g| g.id == target.category_id) else {
            return DropOutcome::NoOp;
        };

        if from_group == to_group {
            let templates = &mut self.groups[from_group].templates;
            let to = target.index.min(templates.len() - 1);
            if to == from_index {
                return DropOutcome::NoOp;
            }
            let record = templates.remove(from_index);
            templates.insert(to, record);
            return DropOutcome::Reordered { group_id: source.group_id, from: from_index, to };
        }

        let mut record = self.groups[from_group].templates.remove(from_index);
        let label = self.groups[to_group].label.clone();
        let previous_category = std::mem::replace(&mut record.category, label.clone());
        let ticket = MoveTicket {
            template_id: record.id.clone(),
            title: record.title.clone(),
            from_group: source.group_id,
            from_label: self.groups[from_group].label.clone(),
            from_index,
            to_group: target.category_id,
            previous_category,
            category: label.clone(),
        };

        let templates = &mut self.groups[to_group].templates;
        let at = target.index.min(templates.len());
        templates.insert(at, record);

        self.toast(ToastKind::Success, format!("Moved \"{}\" to {label}", ticket.title));
        self.pending = Some(ticket.clone());
        self.phase = Phase::Persisting;
        DropOutcome::Pending(ticket)
    }

    /// Settle a pending move with the store's verdict.
    ///
    /// # Errors
    ///
    /// Returns `NoPendingMove` if `ticket` is not the move in flight.
    pub fn complete_move(&mut self, ticket: &MoveTicket, result: Result<(), String>) -> Result<(), PlaygroundError> {
        if self.pending.as_ref() != Some(ticket) {
            return Err(PlaygroundError::NoPendingMove(ticket.template_id.clone()));
        }
        self.pending = None;

        match result {
            Ok(()) => {
                self.phase = Phase::Idle;
            }
            Err(message) => {
                self.phase = Phase::ErrorRollback;
                self.rollback(ticket);
                warn!(id = %ticket.template_id, error = %message, "category move failed; rolled back");
                self.toast(ToastKind::Error, format!("Failed to move \"{}\": {message}", ticket.title));
                self.phase = Phase::Idle;
            }
        }
        Ok(())
    }

    fn rollback(&mut self, ticket: &MoveTicket) {
        let Some(mut removed) = self.remove_local(&ticket.template_id) else {
            warn!(id = %ticket.template_id, "rollback target no longer in playground");
            return;
        };
        removed.record.category.clone_from(&ticket.previous_category);
        self.insert_local(&ticket.from_group, &ticket.from_label, ticket.from_index, removed.record);
    }

    /// Drag `key` onto `target` and persist the category change.
    pub async fn move_template(
        &mut self,
        service: &TemplateService,
        key: &str,
        target: DropTarget,
        actor: &str,
    ) -> MoveOutcome {
        if !self.begin_drag(key) {
            return MoveOutcome::Aborted;
        }
        let ticket = match self.drop_on(Some(target)) {
            DropOutcome::NoOp => return MoveOutcome::NoOp,
            DropOutcome::Reordered { .. } => return MoveOutcome::Reordered,
            DropOutcome::Pending(ticket) => ticket,
        };

        let result = service.update_category(&ticket.template_id, &ticket.category, actor).await;
        let (verdict, outcome) = match result {
            Ok(change) => (Ok(()), MoveOutcome::Persisted { change }),
            Err(e) => {
                let message = e.to_string();
                (Err(message.clone()), MoveOutcome::RolledBack { error: message })
            }
        };
        if let Err(e) = self.complete_move(&ticket, verdict) {
            warn!(error = %e, "move completed out of order");
        }
        outcome
    }

    // -------------------------------------------------------------------------
    // REFRESH
    // -------------------------------------------------------------------------

    /// Merge freshly loaded store data into local groups.
    ///
    /// Records not present locally (by id or by `title+category` key) are
    /// appended to their best-fit group. Incoming records are deduplicated
    /// by id only, so distinct store documents sharing a key all arrive. Local records and their order are
    /// kept even when the store now groups them differently. Returns the
    /// number of records added.
    pub fn refresh(&mut self, records: &[TemplateRecord]) -> usize {
        let mut local_keys: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        for template in self.groups.iter().flat_map(|g| g.templates.iter()) {
            local_keys.insert(template.match_key());
            seen_ids.insert(template.id.clone());
        }

        let mut added = 0;
        for record in records {
            if local_keys.contains(&record.match_key()) || !seen_ids.insert(record.id.clone()) {
                continue;
            }
            let label = self.catalog.resolve_label(&record.category);
            let index = self.group_index_or_create(&label);
            self.groups[index].templates.push(record.clone());
            added += 1;
        }

        if added > 0 {
            info!(added, total = self.total_templates(), "playground refreshed");
        }
        added
    }

    fn group_index_or_create(&mut self, label: &str) -> usize {
        let id = slugify(label);
        if let Some(index) = self.groups.iter().position(|g| g.id == id) {
            return index;
        }
        self.groups.push(CategoryGroup::new(label));
        self.groups.len() - 1
    }

    // -------------------------------------------------------------------------
    // DELETE
    // -------------------------------------------------------------------------

    fn remove_local(&mut self, template_id: &str) -> Option<Removed> {
        for group in &mut self.groups {
            if let Some(index) = group.position(template_id) {
                let record = group.templates.remove(index);
                return Some(Removed { group_id: group.id.clone(), label: group.label.clone(), index, record });
            }
        }
        None
    }

    fn local_ids(&self) -> HashSet<String> {
        self.groups.iter().flat_map(|g| g.templates.iter()).map(|t| t.id.clone()).collect()
    }

    fn insert_local(&mut self, group_id: &str, label: &str, index: usize, record: TemplateRecord) {
        let group_index = match self.groups.iter().position(|g| g.id == group_id) {
            Some(i) => i,
            None => self.group_index_or_create(label),
        };
        let templates = &mut self.groups[group_index].templates;
        let at = index.min(templates.len());
        templates.insert(at, record);
    }

    /// Delete one template: local removal first, then the store.
    ///
    /// The store id is resolved while ignoring documents that belong to
    /// other cards still held locally. A store document that cannot be found
    /// leaves the local removal in place and logs the discrepancy. Any other store error restores the
    /// card at its previous position.
    ///
    /// # Errors
    ///
    /// Returns `UnknownKey` if the key does not resolve locally.
    pub async fn delete_template(
        &mut self,
        service: &TemplateService,
        key: &str,
    ) -> Result<DeleteOutcome, PlaygroundError> {
        let (_, template_id) = parse_key(key).ok_or_else(|| PlaygroundError::UnknownKey(key.to_owned()))?;
        if self.locate(key).is_none() {
            return Err(PlaygroundError::UnknownKey(key.to_owned()));
        }
        let removed = self
            .remove_local(template_id)
            .ok_or_else(|| PlaygroundError::UnknownKey(key.to_owned()))?;
        let record = &removed.record;

        let claimed = self.local_ids();
        let store_result = match service
            .resolve_id_excluding(&record.id, &record.title, &record.category, &claimed)
            .await
        {
            Ok(Some(doc_id)) => service.delete(&doc_id).await.map(|()| true),
            Ok(None) => {
                warn!(id = %record.id, title = %record.title, "no store document for template; removed locally only");
                Ok(false)
            }
            Err(e) => Err(e),
        };

        let outcome = match store_result {
            Ok(store_deleted) => {
                self.toast(ToastKind::Success, format!("Deleted \"{}\"", record.title));
                DeleteOutcome { template_id: record.id.clone(), success: true, store_deleted, error: None }
            }
            Err(e) if e.is_not_found() => {
                warn!(id = %record.id, "store document vanished before delete; removed locally");
                self.toast(ToastKind::Success, format!("Deleted \"{}\"", record.title));
                DeleteOutcome { template_id: record.id.clone(), success: true, store_deleted: false, error: None }
            }
            Err(e) => {
                warn!(error = %e, id = %record.id, "template delete failed; restoring local state");
                let message = e.to_string();
                self.toast(ToastKind::Error, format!("Failed to delete \"{}\": {message}", record.title));
                let template_id = record.id.clone();
                self.insert_local(&removed.group_id, &removed.label, removed.index, removed.record);
                DeleteOutcome { template_id, success: false, store_deleted: false, error: Some(message) }
            }
        };
        Ok(outcome)
    }

    /// Delete many templates, best-effort.
    ///
    /// Every resolvable key is removed from local state even when its store
    /// delete fails; failures are logged and reported per item. Store ids
    /// owned by cards still held locally are never resolved as a fallback.
    pub async fn bulk_delete(&mut self, service: &TemplateService, keys: &[String]) -> BulkDeleteReport {
        let mut report = BulkDeleteReport::default();
        let delay = service.config().bulk_item_delay();

        for (position, key) in keys.iter().enumerate() {
            let removed = match (self.locate(key), parse_key(key)) {
                (Some(_), Some((_, template_id))) => self.remove_local(template_id),
                _ => None,
            };
            let Some(removed) = removed else {
                report.unknown_keys.push(key.clone());
                continue;
            };
            if position > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let record = removed.record;
            let claimed = self.local_ids();
            let result = match service
                .resolve_id_excluding(&record.id, &record.title, &record.category, &claimed)
                .await
            {
                Ok(Some(doc_id)) => service.delete(&doc_id).await.map(|()| true),
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => report.store_deleted += 1,
                Ok(false) => {
                    warn!(id = %record.id, "no store document for template; removed locally only");
                }
                Err(e) if e.is_not_found() => {
                    warn!(id = %record.id, "store document vanished before delete; removed locally");
                }
                Err(e) => {
                    warn!(error = %e, id = %record.id, "bulk delete item failed; removed locally anyway");
                    report.store_failures.push(StoreFailure { id: record.id.clone(), error: e.to_string() });
                }
            }
            report.removed.push(record.id);
        }

        let message = if report.store_failures.is_empty() {
            format!("Deleted {} templates", report.removed.len())
        } else {
            format!(
                "Deleted {} templates ({} could not be removed from the store)",
                report.removed.len(),
                report.store_failures.len()
            )
        };
        let kind = if report.store_failures.is_empty() { ToastKind::Success } else { ToastKind::Info };
        self.toast(kind, message);
        info!(
            removed = report.removed.len(),
            store_deleted = report.store_deleted,
            failed = report.store_failures.len(),
            unknown = report.unknown_keys.len(),
            "bulk delete finished"
        );
        report
    }

    // -------------------------------------------------------------------------
    // EXPORT
    // -------------------------------------------------------------------------

    /// Current grouping as a downloadable JSON document.
    #[must_use]
    pub fn export_json(&self) -> serde_json::Value {
        let categories: Vec<serde_json::Value> = self
            .groups
            .iter()
            .map(|g| {
                serde_json::json!({
                    "id": g.id,
                    "label": g.label,
                    "count": g.templates.len(),
                    "templates": g.templates,
                })
            })
            .collect();
        serde_json::json!({
            "exported_at": now_rfc3339(),
            "total_templates": self.total_templates(),
            "categories": categories,
        })
    }
}

#[cfg(test)]
#[path = "playground_test.rs"]
mod tests;
