use super::*;
use crate::store::test_helpers::{record, record_at};

#[tokio::test]
async fn create_assigns_id_and_timestamps() {
    let store = MemoryTemplateStore::new();
    let created = store.create(NewTemplate::new("Intro", "YouTube Video")).await.unwrap();
    assert!(!created.id.is_empty());
    assert!(created.created_at > 0);
    assert_eq!(created.created_at, created.last_modified);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn create_rejects_missing_title() {
    let store = MemoryTemplateStore::new();
    let err = store.create(NewTemplate::new("", "Reels")).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("title")));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn create_rejects_missing_category() {
    let store = MemoryTemplateStore::new();
    let err = store.create(NewTemplate::new("Intro", " ")).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("category")));
}

#[tokio::test]
async fn create_strips_blank_optionals() {
    let store = MemoryTemplateStore::new();
    let new = NewTemplate { preview_url: Some("  ".into()), ..NewTemplate::new("Intro", "Reels") };
    let created = store.create(new).await.unwrap();
    assert_eq!(created.preview_url, None);
}

#[tokio::test]
async fn list_orders_by_created_then_id() {
    let store = MemoryTemplateStore::with_records(vec![
        record_at("b", "B", "X", 2),
        record_at("c", "C", "X", 1),
        record_at("a", "A", "X", 2),
    ]);
    let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn list_by_category_is_exact() {
    let store = MemoryTemplateStore::with_records(vec![
        record("a", "A", "YouTube Video"),
        record("b", "B", "youtube-video"),
    ]);
    let found = store.list_by_category("YouTube Video").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "a");
}

#[tokio::test]
async fn update_category_records_previous() {
    let store = MemoryTemplateStore::with_records(vec![record("a", "A", "Reels")]);
    let change = store.update_category("a", "Shorts", "alice").await.unwrap();
    assert_eq!(change.previous, "Reels");
    assert_eq!(change.current, "Shorts");
    assert_eq!(change.actor, "alice");

    let stored = store.get("a").await.unwrap().unwrap();
    assert_eq!(stored.category, "Shorts");
    assert_eq!(store.audit_log("a").await.unwrap(), vec![change]);
}

#[tokio::test]
async fn update_category_missing_is_not_found() {
    let store = MemoryTemplateStore::new();
    let err = store.update_category("ghost", "Shorts", "alice").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn update_categories_isolates_missing_items() {
    let store = MemoryTemplateStore::with_records(vec![record("a", "A", "Reels"), record("b", "B", "Reels")]);
    let chunk = vec![
        CategoryUpdate { id: "a".into(), category: "Shorts".into(), actor: "op".into() },
        CategoryUpdate { id: "ghost".into(), category: "Shorts".into(), actor: "op".into() },
        CategoryUpdate { id: "b".into(), category: "Stories".into(), actor: "op".into() },
    ];
    let results = store.update_categories(&chunk).await;
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(StoreError::NotFound(_))));
    assert!(results[2].is_ok());
    assert_eq!(store.get("b").await.unwrap().unwrap().category, "Stories");
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let store = MemoryTemplateStore::with_records(vec![record("a", "A", "Reels")]);
    store.delete("a").await.unwrap();
    assert!(store.delete("a").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn find_by_title_category_ignores_case() {
    let store = MemoryTemplateStore::with_records(vec![record("a", "Summer Sale", "Marketing")]);
    let found = store.find_by_title_category("summer sale", "MARKETING ").await.unwrap();
    assert_eq!(found.map(|r| r.id).as_deref(), Some("a"));
}
