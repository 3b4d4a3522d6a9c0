use super::helpers::small_cfg;
use crate::Engine;

/// A store whose data ends up spread across two overlapping level-1
/// tables and the active memtable — every scan source shape at once.
fn seeded_engine(dir: &std::path::Path) -> Engine {
    let mut cfg = small_cfg(dir);
    cfg.memtable_capacity = 3;
    cfg.level_table_limit = 100;
    let mut engine = Engine::open(cfg).unwrap();

    for (k, v) in [
        ("fruit:apple", "red"),
        ("fruit:banana", "yellow"),
        ("veg:carrot", "orange"),
    ] {
        engine.put(k, v.as_bytes()).unwrap();
    }
    engine.flush_all().unwrap();

    for (k, v) in [
        ("fruit:cherry", "dark"),
        ("veg:daikon", "white"),
        ("fruit:apple", "green"), // overwrite, newest wins
        ("fruit:elder", "black"),
    ] {
        engine.put(k, v.as_bytes()).unwrap();
    }
    engine
}

#[test]
fn prefix_scan_merges_all_sources_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let engine = seeded_engine(dir.path());

    let page = engine.prefix_scan("fruit:", 1, 10).unwrap();
    let keys: Vec<&str> = page.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        keys,
        vec!["fruit:apple", "fruit:banana", "fruit:cherry", "fruit:elder"]
    );
}

#[test]
fn overwritten_key_appears_once_with_newest_value() {
    let dir = tempfile::tempdir().unwrap();
    let engine = seeded_engine(dir.path());

    let page = engine.prefix_scan("fruit:apple", 1, 10).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].1, b"green", "newest version wins across sources");
}

#[test]
fn deleted_key_is_absent_from_scans() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = seeded_engine(dir.path());

    engine.delete("fruit:banana").unwrap();
    let page = engine.prefix_scan("fruit:", 1, 10).unwrap();
    let keys: Vec<&str> = page.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["fruit:apple", "fruit:cherry", "fruit:elder"]);
}

#[test]
fn pagination_splits_without_gaps_or_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let engine = seeded_engine(dir.path());

    let page1 = engine.prefix_scan("fruit:", 1, 2).unwrap();
    let page2 = engine.prefix_scan("fruit:", 2, 2).unwrap();
    let page3 = engine.prefix_scan("fruit:", 3, 2).unwrap();

    let keys: Vec<String> = page1
        .iter()
        .chain(page2.iter())
        .map(|(k, _)| k.clone())
        .collect();
    assert_eq!(
        keys,
        vec!["fruit:apple", "fruit:banana", "fruit:cherry", "fruit:elder"]
    );
    assert!(page3.is_empty(), "past the last page");
}

#[test]
fn range_scan_is_inclusive_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let engine = seeded_engine(dir.path());

    let page = engine
        .range_scan("fruit:banana", "veg:carrot", 1, 10)
        .unwrap();
    let keys: Vec<&str> = page.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "fruit:banana",
            "fruit:cherry",
            "fruit:elder",
            "veg:carrot"
        ]
    );
}

#[test]
fn range_scan_with_empty_interval_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let engine = seeded_engine(dir.path());
    assert!(engine.range_scan("x", "y", 1, 10).unwrap().is_empty());
}

#[test]
fn scan_spanning_memtables_and_compacted_tables() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = small_cfg(dir.path());
    cfg.level_table_limit = 2;
    let mut engine = Engine::open(cfg).unwrap();

    for i in 0..10 {
        engine.put(&format!("item{:02}", i), b"v").unwrap();
    }

    let page = engine.prefix_scan("item", 1, 20).unwrap();
    let keys: Vec<&str> = page.iter().map(|(k, _)| k.as_str()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("item{:02}", i)).collect();
    assert_eq!(keys, expected);
}
