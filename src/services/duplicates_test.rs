#![allow(clippy::float_cmp)]

use std::sync::Arc;

use super::*;
use crate::config::CuratorConfig;
use crate::store::MemoryTemplateStore;
use crate::store::test_helpers::{fast_config, flaky_service, memory_service, record, record_at};

fn with_preview(mut r: TemplateRecord, url: &str) -> TemplateRecord {
    r.preview_url = Some(url.into());
    r
}

fn with_usage(mut r: TemplateRecord, score: i64) -> TemplateRecord {
    r.usage_score = Some(score);
    r
}

// =============================================================================
// similarity
// =============================================================================

#[test]
fn identical_triples_score_exactly_one() {
    let a = with_preview(record("a", "Summer Sale", "Marketing"), "https://img.example.com/a.jpg");
    let b = with_preview(record("b", "summer  SALE", "marketing"), "https://img.example.com/b.jpg");
    assert_eq!(signature(&a), signature(&b));
    assert!((similarity(&a, &b) - 1.0).abs() < f64::EPSILON);
    assert_eq!(similarity(&a, &b), 1.0);
}

#[test]
fn disjoint_records_score_zero() {
    let a = with_preview(record("a", "Summer Sale", "Marketing"), "https://one.example.com/a.jpg");
    let b = with_preview(record("b", "Wedding Invite", "Events"), "https://two.example.org/b.jpg");
    assert_eq!(similarity(&a, &b), 0.0);
}

#[test]
fn punctuation_does_not_split_duplicates() {
    let a = with_preview(record("a", "Summer Sale", "Marketing"), "https://img.example.com/a.jpg");
    let b = with_preview(record("b", "Summer Sale!!", "marketing"), "https://img.example.com/b.jpg");
    assert!(similarity(&a, &b) >= POTENTIAL_THRESHOLD);

    let report = detect(&[a, b]);
    let grouped = report.duplicates.len() + report.potential.len();
    assert_eq!(grouped, 1);
}

#[test]
fn empty_titles_never_match() {
    let a = record("a", "", "Marketing");
    let b = record("b", "  ", "Marketing");
    assert_eq!(token_similarity(&a.title, &b.title), 0.0);
    assert!(similarity(&a, &b) < POTENTIAL_THRESHOLD);
    assert!(detect(&[a, b]).duplicates.is_empty());
}

#[test]
fn shared_domain_alone_scores_a_tenth() {
    let a = with_preview(record("a", "Alpha", "Reels"), "https://cdn.example.com/1.png");
    let b = with_preview(record("b", "Beta", "Posters"), "https://cdn.example.com/2.png");
    assert!((similarity(&a, &b) - 0.1).abs() < 1e-9);
}

#[test]
fn token_similarity_is_jaccard() {
    assert!((token_similarity("big summer sale", "summer sale") - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(token_similarity("", ""), 0.0);
}

// =============================================================================
// detect
// =============================================================================

#[test]
fn exact_group_keeps_highest_usage() {
    let records = vec![
        with_usage(record_at("a", "Logo Reveal", "Intro", 1), 5),
        with_usage(record_at("b", "Logo Reveal", "intro", 2), 40),
        record_at("c", "logo reveal", "INTRO", 3),
    ];
    let report = detect(&records);
    assert_eq!(report.duplicates.len(), 1);
    let group = &report.duplicates[0];
    assert_eq!(group.kind, GroupKind::Exact);
    assert_eq!(group.keep.id, "b");
    assert_eq!(group.member_ids(), vec!["b", "a", "c"]);
    assert_eq!(report.removable(), 2);
}

#[test]
fn exact_group_tie_prefers_newer() {
    let records = vec![record_at("old", "Logo Reveal", "Intro", 1), record_at("new", "Logo Reveal", "Intro", 9)];
    let report = detect(&records);
    assert_eq!(report.duplicates[0].keep.id, "new");
}

#[test]
fn near_match_lands_in_potential_group() {
    // 6 shared words of 7 → 0.6 * 6/7 + 0.3 + 0.1 ≈ 0.914
    let a = record_at("a", "bold modern corporate summer promo sale banner", "Marketing", 1);
    let b = record_at("b", "bold modern corporate summer promo sale", "Marketing", 2);
    let score = similarity(&a, &b);
    assert!((POTENTIAL_THRESHOLD..EXACT_THRESHOLD).contains(&score), "score {score}");

    let report = detect(&[a, b]);
    assert!(report.duplicates.is_empty());
    assert_eq!(report.potential.len(), 1);
    assert_eq!(report.potential[0].kind, GroupKind::Potential);
}

#[test]
fn claimed_records_are_not_regrouped() {
    let records = vec![
        record_at("a", "Logo Reveal", "Intro", 1),
        record_at("b", "Logo Reveal", "Intro", 2),
        record_at("c", "Logo Reveal", "Intro", 3),
        record_at("d", "Neon Sign", "Intro", 4),
    ];
    let report = detect(&records);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].member_ids().len(), 3);
    assert!(report.potential.is_empty());
}

#[test]
fn detection_is_idempotent_and_order_independent() {
    let records = vec![
        record_at("a", "Logo Reveal", "Intro", 3),
        record_at("b", "Neon Sign", "Intro", 1),
        record_at("c", "Logo Reveal", "Intro", 2),
        record_at("d", "Neon Sign", "intro", 4),
    ];
    let first = detect(&records);
    let second = detect(&records);
    assert_eq!(first, second);

    let mut reversed = records.clone();
    reversed.reverse();
    assert_eq!(detect(&reversed), first);
}

#[test]
fn detection_does_not_mutate_input() {
    let records = vec![record("a", "Logo Reveal", "Intro"), record("b", "Logo Reveal", "Intro")];
    let before = records.clone();
    let _ = detect(&records);
    assert_eq!(records, before);
}

// =============================================================================
// cleanup
// =============================================================================

#[tokio::test]
async fn cleanup_writes_backup_then_deletes() {
    let records = vec![record_at("a", "Logo Reveal", "Intro", 1), record_at("b", "Logo Reveal", "Intro", 2)];
    let (service, store) = memory_service(records.clone());
    let report = detect(&records);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.json");
    let options = CleanupOptions { backup_path: Some(path.clone()), dry_run: false };
    let outcome = cleanup(&service, &report, &options).await.unwrap();

    assert_eq!(outcome.deleted, vec!["a".to_owned()]);
    assert_eq!(store.len().await, 1);

    let backup: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(backup["removable"], 1);
    assert_eq!(backup["groups"][0]["keep"]["id"], "b");
}

#[tokio::test]
async fn cleanup_deletes_each_target_in_group_order() {
    let records = vec![
        record_at("a", "Logo Reveal", "Intro", 1),
        record_at("b", "Logo Reveal", "Intro", 2),
        record_at("c", "Logo Reveal", "Intro", 3),
        record_at("d", "Neon Sign", "Promo", 1),
        record_at("e", "Neon Sign", "Promo", 2),
    ];
    let store = Arc::new(MemoryTemplateStore::with_records(records.clone()));
    let config = CuratorConfig { store_batch_limit: 1, ..fast_config() };
    let service = TemplateService::new(store.clone(), config);

    let outcome = cleanup(&service, &detect(&records), &CleanupOptions::default()).await.unwrap();
    assert_eq!(outcome.planned, 3);
    assert_eq!(outcome.deleted, vec!["b", "a", "d"]);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn cleanup_dry_run_touches_nothing() {
    let records = vec![record_at("a", "Logo Reveal", "Intro", 1), record_at("b", "Logo Reveal", "Intro", 2)];
    let (service, store) = memory_service(records.clone());
    let options = CleanupOptions { backup_path: None, dry_run: true };

    let outcome = cleanup(&service, &detect(&records), &options).await.unwrap();
    assert_eq!(outcome.planned, 1);
    assert!(outcome.deleted.is_empty());
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn cleanup_accumulates_per_item_errors() {
    let records = vec![
        record_at("a", "Logo Reveal", "Intro", 1),
        record_at("b", "Logo Reveal", "Intro", 2),
        record_at("c", "Logo Reveal", "Intro", 3),
    ];
    let (service, store) = flaky_service(records.clone());
    store.fail_delete_of("a");

    let outcome = cleanup(&service, &detect(&records), &CleanupOptions::default()).await.unwrap();
    assert_eq!(outcome.planned, 2);
    assert_eq!(outcome.deleted, vec!["b".to_owned()]);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].id, "a");
}

#[tokio::test]
async fn cleanup_counts_already_deleted_as_missing() {
    let records = vec![record_at("a", "Logo Reveal", "Intro", 1), record_at("b", "Logo Reveal", "Intro", 2)];
    let (service, _) = memory_service(vec![records[1].clone()]);

    let outcome = cleanup(&service, &detect(&records), &CleanupOptions::default()).await.unwrap();
    assert_eq!(outcome.missing, vec!["a".to_owned()]);
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn cleanup_aborts_when_backup_fails() {
    let records = vec![record_at("a", "Logo Reveal", "Intro", 1), record_at("b", "Logo Reveal", "Intro", 2)];
    let (service, store) = memory_service(records.clone());
    let options = CleanupOptions {
        backup_path: Some(PathBuf::from("/nonexistent-dir-for-curator-tests/backup.json")),
        dry_run: false,
    };

    let err = cleanup(&service, &detect(&records), &options).await.unwrap_err();
    assert!(matches!(err, DuplicateError::Backup { .. }));
    assert_eq!(store.len().await, 2);
}
