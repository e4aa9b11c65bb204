//! Duplicate detector: weighted similarity and greedy clustering.
//!
//! DESIGN
//! ======
//! Pairwise score, in tenths so identical records land on exactly 1.0:
//!
//! ```text
//! score = (6·jaccard(title words) + 3·[category equal] + 1·[preview host equal]) / 10
//! ```
//!
//! Records are ordered by (`created_at`, `id`) before clustering so the same
//! data always yields the same groups regardless of store enumeration order.
//! The oldest unclaimed record anchors a cluster; every later unclaimed
//! record scoring ≥ [`EXACT_THRESHOLD`] against it joins. A second pass over
//! what is left builds potential groups from scores in
//! [[`POTENTIAL_THRESHOLD`], [`EXACT_THRESHOLD`]).
//!
//! Detection never mutates data. [`cleanup`] is the only destructive step and
//! writes its JSON backup before the first delete.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::services::accessor::TemplateService;
use crate::template::{TemplateRecord, normalize_label, now_rfc3339, words};

pub const EXACT_THRESHOLD: f64 = 0.95;
pub const POTENTIAL_THRESHOLD: f64 = 0.85;

const TITLE_WEIGHT: f64 = 6.0;
const CATEGORY_WEIGHT: f64 = 3.0;
const DOMAIN_WEIGHT: f64 = 1.0;
const WEIGHT_SCALE: f64 = 10.0;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DuplicateError {
    #[error("failed to write backup {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize backup: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl crate::error::ErrorCode for DuplicateError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Backup { .. } => "E_BACKUP_FAILED",
            Self::Serialize(_) => "E_SERIALIZE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Exact,
    Potential,
}

/// Records judged equivalent. `keep` is the preferred survivor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub kind: GroupKind,
    /// Signature of the kept record.
    pub signature: String,
    pub keep: TemplateRecord,
    pub remove: Vec<TemplateRecord>,
    /// Lowest member score against the cluster anchor.
    pub score: f64,
}

impl DuplicateGroup {
    /// Ids of every member, kept record first.
    #[must_use]
    pub fn member_ids(&self) -> Vec<&str> {
        std::iter::once(self.keep.id.as_str())
            .chain(self.remove.iter().map(|r| r.id.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub scanned: usize,
    pub duplicates: Vec<DuplicateGroup>,
    pub potential: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    /// Number of records exact cleanup would delete.
    #[must_use]
    pub fn removable(&self) -> usize {
        self.duplicates.iter().map(|g| g.remove.len()).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Write the duplicate set here before deleting anything.
    pub backup_path: Option<PathBuf>,
    /// Report what would be deleted without touching the store.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub planned: usize,
    pub deleted: Vec<String>,
    /// Already gone from the store when the delete was issued.
    pub missing: Vec<String>,
    pub errors: Vec<CleanupFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub id: String,
    pub error: String,
}

// =============================================================================
// SIMILARITY
// =============================================================================

/// Comparable parts of a record, computed once per scan.
struct Features {
    title: HashSet<String>,
    category: String,
    domain: Option<String>,
}

impl Features {
    fn of(record: &TemplateRecord) -> Self {
        Self {
            title: words(&record.title).into_iter().collect(),
            category: normalize_label(&record.category),
            domain: record.preview_domain(),
        }
    }
}

/// Jaccard index of the lower-cased title words. Two empty titles score 0.
#[must_use]
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = words(a).into_iter().collect();
    let b: HashSet<String> = words(b).into_iter().collect();
    jaccard(&a, &b)
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let score = a.intersection(b).count() as f64 / union as f64;
    score
}

fn score_features(a: &Features, b: &Features) -> f64 {
    let title = jaccard(&a.title, &b.title);
    let category = if a.category == b.category { 1.0 } else { 0.0 };
    let domain = if a.domain == b.domain { 1.0 } else { 0.0 };
    (TITLE_WEIGHT * title + CATEGORY_WEIGHT * category + DOMAIN_WEIGHT * domain) / WEIGHT_SCALE
}

/// Weighted similarity of two records in `[0, 1]`.
#[must_use]
pub fn similarity(a: &TemplateRecord, b: &TemplateRecord) -> f64 {
    score_features(&Features::of(a), &Features::of(b))
}

/// Hex SHA-256 of the normalized (title, category, preview host) triple.
#[must_use]
pub fn signature(record: &TemplateRecord) -> String {
    let mut title = words(&record.title);
    title.sort();
    title.dedup();
    let mut hasher = Sha256::new();
    hasher.update(title.join(" ").as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalize_label(&record.category).as_bytes());
    hasher.update([0x1f]);
    hasher.update(record.preview_domain().unwrap_or_default().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// =============================================================================
// DETECTION
// =============================================================================

/// Partition `records` into exact and potential duplicate groups.
#[must_use]
pub fn detect(records: &[TemplateRecord]) -> DuplicateReport {
    let mut ordered: Vec<&TemplateRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    let features: Vec<Features> = ordered.iter().map(|r| Features::of(r)).collect();

    let mut claimed = vec![false; ordered.len()];
    let duplicates = cluster(&ordered, &features, &mut claimed, GroupKind::Exact);
    let potential = cluster(&ordered, &features, &mut claimed, GroupKind::Potential);

    let report = DuplicateReport { scanned: records.len(), duplicates, potential };
    info!(
        scanned = report.scanned,
        exact_groups = report.duplicates.len(),
        potential_groups = report.potential.len(),
        removable = report.removable(),
        "duplicate scan finished"
    );
    report
}

fn in_band(kind: GroupKind, score: f64) -> bool {
    match kind {
        GroupKind::Exact => score >= EXACT_THRESHOLD,
        GroupKind::Potential => (POTENTIAL_THRESHOLD..EXACT_THRESHOLD).contains(&score),
    }
}

fn cluster(
    ordered: &[&TemplateRecord],
    features: &[Features],
    claimed: &mut [bool],
    kind: GroupKind,
) -> Vec<DuplicateGroup> {
    let mut groups = Vec::new();
    for anchor in 0..ordered.len() {
        if claimed[anchor] {
            continue;
        }

        let mut members = vec![anchor];
        let mut lowest = 1.0_f64;
        for candidate in (anchor + 1)..ordered.len() {
            if claimed[candidate] {
                continue;
            }
            let score = score_features(&features[anchor], &features[candidate]);
            if in_band(kind, score) {
                members.push(candidate);
                lowest = lowest.min(score);
            }
        }

        if members.len() < 2 {
            continue;
        }
        for &member in &members {
            claimed[member] = true;
        }
        let records: Vec<TemplateRecord> = members.iter().map(|&i| ordered[i].clone()).collect();
        groups.push(build_group(kind, records, lowest));
    }
    groups
}

/// Preference order: higher usage score, then newer, then smaller id.
fn build_group(kind: GroupKind, mut records: Vec<TemplateRecord>, score: f64) -> DuplicateGroup {
    records.sort_by(|a, b| {
        b.usage_score
            .unwrap_or(0)
            .cmp(&a.usage_score.unwrap_or(0))
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    let keep = records.remove(0);
    DuplicateGroup { kind, signature: signature(&keep), keep, remove: records, score }
}

// =============================================================================
// CLEANUP
// =============================================================================

/// JSON document written before destructive cleanup.
///
/// # Errors
///
/// Returns an error if the groups fail to serialize.
pub fn backup_json(report: &DuplicateReport) -> Result<serde_json::Value, DuplicateError> {
    Ok(serde_json::json!({
        "created_at": now_rfc3339(),
        "scanned": report.scanned,
        "removable": report.removable(),
        "groups": serde_json::to_value(&report.duplicates)?,
    }))
}

async fn write_backup(report: &DuplicateReport, path: &Path) -> Result<(), DuplicateError> {
    let rendered = serde_json::to_vec_pretty(&backup_json(report)?)?;
    tokio::fs::write(path, rendered)
        .await
        .map_err(|source| DuplicateError::Backup { path: path.to_path_buf(), source })
}

/// Delete the non-preferred members of every exact group.
///
/// Deletes are issued one at a time, in group order, with the configured
/// pause between items. Each delete is its own store call. Per-item failures
/// are collected and never stop the run.
///
/// # Errors
///
/// Returns an error only when the requested backup cannot be written; in
/// that case nothing has been deleted.
pub async fn cleanup(
    service: &TemplateService,
    report: &DuplicateReport,
    options: &CleanupOptions,
) -> Result<CleanupReport, DuplicateError> {
    let targets: Vec<&str> = report
        .duplicates
        .iter()
        .flat_map(|g| g.remove.iter().map(|r| r.id.as_str()))
        .collect();
    let mut outcome = CleanupReport { planned: targets.len(), dry_run: options.dry_run, ..CleanupReport::default() };

    if let Some(path) = &options.backup_path {
        write_backup(report, path).await?;
        info!(path = %path.display(), groups = report.duplicates.len(), "duplicate backup written");
        outcome.backup = Some(path.clone());
    }

    if options.dry_run || targets.is_empty() {
        return Ok(outcome);
    }

    let delay = service.config().bulk_item_delay();
    for (position, id) in targets.iter().enumerate() {
        if position > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match service.delete(id).await {
            Ok(()) => outcome.deleted.push((*id).to_owned()),
            Err(e) if e.is_not_found() => outcome.missing.push((*id).to_owned()),
            Err(e) => {
                warn!(error = %e, %id, "duplicate delete failed");
                outcome.errors.push(CleanupFailure { id: (*id).to_owned(), error: e.to_string() });
            }
        }
    }

    info!(
        planned = outcome.planned,
        deleted = outcome.deleted.len(),
        missing = outcome.missing.len(),
        failed = outcome.errors.len(),
        "duplicate cleanup finished"
    );
    Ok(outcome)
}

#[cfg(test)]
#[path = "duplicates_test.rs"]
mod tests;
