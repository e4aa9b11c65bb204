use super::*;
use crate::store::test_helpers::{fast_config, flaky_service, memory_service, record};
use crate::store::MemoryTemplateStore;

fn updates(ids: &[&str], category: &str) -> Vec<CategoryUpdate> {
    ids.iter()
        .map(|id| CategoryUpdate { id: (*id).to_owned(), category: category.to_owned(), actor: "op".into() })
        .collect()
}

// =============================================================================
// update_category
// =============================================================================

#[tokio::test]
async fn update_category_publishes_event() {
    let (service, _) = memory_service(vec![record("a", "Intro", "Reels")]);
    let mut rx = service.events().subscribe();

    let change = service.update_category("a", " Shorts ", "alice").await.unwrap();
    assert_eq!(change.previous, "Reels");
    assert_eq!(change.current, "Shorts");

    assert_eq!(
        rx.recv().await.unwrap(),
        TemplateEvent::CategoryUpdated { id: "a".into(), previous: "Reels".into(), current: "Shorts".into() }
    );
}

#[tokio::test]
async fn update_category_not_found() {
    let (service, _) = memory_service(Vec::new());
    let err = service.update_category("ghost", "Shorts", "alice").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn update_category_rejects_blank() {
    let (service, store) = memory_service(vec![record("a", "Intro", "Reels")]);
    let err = service.update_category("a", "  ", "alice").await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(store.get("a").await.unwrap().unwrap().category, "Reels");
}

#[tokio::test]
async fn update_category_audits_previous_value() {
    let (service, _) = memory_service(vec![record("a", "Intro", "Reels")]);
    service.update_category("a", "Shorts", "alice").await.unwrap();
    service.update_category("a", "Stories", "bob").await.unwrap();

    let log = service.audit_log("a").await.unwrap();
    let trail: Vec<(&str, &str)> = log.iter().map(|c| (c.previous.as_str(), c.current.as_str())).collect();
    assert_eq!(trail, vec![("Reels", "Shorts"), ("Shorts", "Stories")]);
}

// =============================================================================
// bulk_update_categories
// =============================================================================

#[tokio::test]
async fn bulk_update_chunks_by_batch_limit() {
    let records: Vec<_> = (0..1_201).map(|i| record(&format!("t{i:04}"), "T", "Old")).collect();
    let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    let store = std::sync::Arc::new(MemoryTemplateStore::with_records(records));
    let service = TemplateService::new(store.clone(), fast_config());

    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let report = service.bulk_update_categories(updates(&refs, "New")).await;

    assert_eq!(report.chunks, 3);
    assert_eq!(report.succeeded(), 1_201);
    assert!(store.list().await.unwrap().iter().all(|r| r.category == "New"));
}

#[tokio::test]
async fn bulk_update_respects_custom_limit() {
    let store = std::sync::Arc::new(MemoryTemplateStore::with_records(vec![
        record("a", "A", "Old"),
        record("b", "B", "Old"),
        record("c", "C", "Old"),
    ]));
    let config = CuratorConfig { store_batch_limit: 2, ..fast_config() };
    let service = TemplateService::new(store, config);

    let report = service.bulk_update_categories(updates(&["a", "b", "c"], "New")).await;
    assert_eq!(report.chunks, 2);
}

#[tokio::test]
async fn bulk_update_reports_each_item() {
    let (service, _) = memory_service(vec![record("a", "A", "Old"), record("c", "C", "Old")]);
    let mut batch = updates(&["a", "ghost", "c"], "New");
    batch.push(CategoryUpdate { id: "c".into(), category: "   ".into(), actor: "op".into() });

    let report = service.bulk_update_categories(batch).await;
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);

    let ghost = report.outcomes.iter().find(|o| o.id == "ghost").unwrap();
    assert!(!ghost.success);
    assert!(ghost.error.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn bulk_update_store_failure_marks_items_failed() {
    let (service, store) = flaky_service(vec![record("a", "A", "Old"), record("b", "B", "Old")]);
    store.fail_updates(true);

    let report = service.bulk_update_categories(updates(&["a", "b"], "New")).await;
    assert_eq!(report.failed(), 2);
    assert_eq!(store.inner.get("a").await.unwrap().unwrap().category, "Old");
}

#[tokio::test]
async fn bulk_update_empty_is_noop() {
    let (service, _) = memory_service(Vec::new());
    let report = service.bulk_update_categories(Vec::new()).await;
    assert_eq!(report.chunks, 0);
    assert!(report.outcomes.is_empty());
}

// =============================================================================
// create / delete
// =============================================================================

#[tokio::test]
async fn create_validates_and_publishes() {
    let (service, _) = memory_service(Vec::new());
    let mut rx = service.events().subscribe();

    let err = service.create(NewTemplate::new("", "Reels")).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let created = service.create(NewTemplate::new("Intro", "Reels")).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), TemplateEvent::TemplateCreated { id: created.id });
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let (service, _) = memory_service(Vec::new());
    assert!(service.delete("ghost").await.unwrap_err().is_not_found());
}

// =============================================================================
// resolve_id
// =============================================================================

#[tokio::test]
async fn resolve_id_direct_hit() {
    let (service, _) = memory_service(vec![record("abc", "Intro", "Reels")]);
    assert_eq!(service.resolve_id("abc", "", "").await.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn resolve_id_via_variant() {
    let (service, _) = memory_service(vec![record("abc", "Intro", "Reels")]);
    let resolved = service.resolve_id(" Template_ABC ", "", "").await.unwrap();
    assert_eq!(resolved.as_deref(), Some("abc"));
}

#[tokio::test]
async fn resolve_id_via_title_and_category() {
    let (service, _) = memory_service(vec![record("abc", "Summer Sale", "Marketing")]);
    let resolved = service.resolve_id("local-1", "summer sale", "marketing").await.unwrap();
    assert_eq!(resolved.as_deref(), Some("abc"));
}

#[tokio::test]
async fn resolve_id_unresolved() {
    let (service, _) = memory_service(vec![record("abc", "Summer Sale", "Marketing")]);
    assert_eq!(service.resolve_id("zzz", "Winter", "Marketing").await.unwrap(), None);
}

#[tokio::test]
async fn resolve_id_skips_claimed_documents() {
    let (service, _) = memory_service(vec![record("abc", "Summer Sale", "Marketing")]);
    let claimed: HashSet<String> = HashSet::from(["abc".to_owned()]);

    let by_title = service.resolve_id_excluding("local-1", "Summer Sale", "Marketing", &claimed).await.unwrap();
    assert_eq!(by_title, None);
    let by_variant = service.resolve_id_excluding("template_abc", "", "", &claimed).await.unwrap();
    assert_eq!(by_variant, None);

    let unclaimed = service.resolve_id_excluding("local-1", "Summer Sale", "Marketing", &HashSet::new()).await.unwrap();
    assert_eq!(unclaimed.as_deref(), Some("abc"));
}

// =============================================================================
// events
// =============================================================================

#[tokio::test]
async fn services_can_share_one_event_bus() {
    let bus = EventBus::new();
    let (first, _) = memory_service(vec![record("a", "Intro", "Reels")]);
    let (second, _) = memory_service(vec![record("b", "Outro", "Reels")]);
    let first = first.with_events(bus.clone());
    let second = second.with_events(bus.clone());
    let mut rx = bus.subscribe();

    first.delete("a").await.unwrap();
    second.delete("b").await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), TemplateEvent::TemplateDeleted { id: "a".into() });
    assert_eq!(rx.recv().await.unwrap(), TemplateEvent::TemplateDeleted { id: "b".into() });
}

#[test]
fn id_variants_cover_composite_and_prefix() {
    let variants = id_variants("reels|||Template-XYZ");
    assert!(variants.contains(&"Template-XYZ".to_owned()));
    assert!(variants.contains(&"template-xyz".to_owned()));
    assert!(variants.contains(&"xyz".to_owned()));
    assert!(!variants.contains(&"reels|||Template-XYZ".to_owned()));
}
