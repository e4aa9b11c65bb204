use super::*;
use crate::store::test_helpers::record;

#[test]
fn default_catalog_has_known_labels() {
    let catalog = CategoryCatalog::default();
    assert!(catalog.len() >= 150);
    assert_eq!(catalog.labels().next(), Some("YouTube Video"));
}

#[test]
fn best_match_folds_spellings() {
    let catalog = CategoryCatalog::default();
    assert_eq!(catalog.best_match("youtube-video"), Some("YouTube Video"));
    assert_eq!(catalog.best_match("YOUTUBE VIDEOS"), Some("YouTube Video"));
    assert_eq!(catalog.best_match("instagram_reels"), Some("Instagram Reel"));
}

#[test]
fn best_match_fuzzy_prefers_higher_overlap() {
    let catalog = CategoryCatalog::new(["Wedding", "Wedding Invitation"]);
    assert_eq!(catalog.best_match("wedding invitation card"), Some("Wedding Invitation"));
}

#[test]
fn best_match_ties_keep_catalog_order() {
    let catalog = CategoryCatalog::new(["Summer Sale", "Summer Party"]);
    assert_eq!(catalog.best_match("summer"), Some("Summer Sale"));
}

#[test]
fn best_match_rejects_weak_overlap() {
    let catalog = CategoryCatalog::new(["YouTube Video Intro Animation"]);
    assert_eq!(catalog.best_match("intro"), None);
    assert_eq!(catalog.best_match(""), None);
}

#[test]
fn resolve_label_falls_back_to_raw_then_uncategorized() {
    let catalog = CategoryCatalog::new(["Reels"]);
    assert_eq!(catalog.resolve_label("reel"), "Reels");
    assert_eq!(catalog.resolve_label("  Pottery Class "), "Pottery Class");
    assert_eq!(catalog.resolve_label("  "), UNCATEGORIZED);
    assert_eq!(catalog.resolve_label("--"), UNCATEGORIZED);
}

#[test]
fn reload_replaces_labels() {
    let mut catalog = CategoryCatalog::new(["A Label"]);
    catalog.reload(["Other", "other", "  "]);
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.best_match("a label"), None);
}

#[test]
fn group_partitions_every_record_once() {
    let catalog = CategoryCatalog::default();
    let records = vec![
        record("a", "One", "YouTube Video"),
        record("b", "Two", "youtube-video"),
        record("c", "Three", "Pottery Class"),
        record("d", "Four", ""),
        record("e", "Five", "Instagram Story"),
    ];
    let groups = catalog.group(&records);

    let total: usize = groups.iter().map(|g| g.templates.len()).sum();
    assert_eq!(total, records.len());

    let mut seen = std::collections::HashSet::new();
    for group in &groups {
        for t in &group.templates {
            assert!(seen.insert(t.id.clone()), "{} appears twice", t.id);
        }
    }

    let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec!["YouTube Video", "Instagram Story", "Pottery Class", UNCATEGORIZED]);
    assert_eq!(groups[0].id, "youtube-video");
    let ids: Vec<&str> = groups[0].templates.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn group_appearance_is_stable() {
    let a = CategoryGroup::new("YouTube Video");
    let b = CategoryGroup::new("youtube video");
    assert_eq!(a.id, b.id);
    assert_eq!(a.color, b.color);
    assert_eq!(a.icon, b.icon);
    assert!(a.expanded);
}
