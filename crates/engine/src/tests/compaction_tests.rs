use super::helpers::small_cfg;
use crate::Engine;
use config::{CompactionStrategy, CompactionTrigger};
use sstable::Table;

/// Engine whose level 1 compacts as soon as it holds `limit` tables.
fn engine_with_count_trigger(dir: &std::path::Path, limit: usize) -> Engine {
    let mut cfg = small_cfg(dir);
    cfg.level_table_limit = limit;
    Engine::open(cfg).unwrap()
}

/// Flushes one two-key table per call.
fn flush_pair(engine: &mut Engine, a: (&str, &[u8]), b: (&str, &[u8])) {
    engine.put(a.0, a.1).unwrap();
    engine.put(b.0, b.1).unwrap();
    engine.flush_all().unwrap();
}

#[test]
fn count_trigger_merges_level_one_into_level_two() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with_count_trigger(dir.path(), 2);

    flush_pair(&mut engine, ("a", b"1"), ("b", b"2"));
    assert_eq!(engine.table_count_at(1), 1);
    assert_eq!(engine.table_count_at(2), 0);

    // The second flush reaches the threshold (2 × level 1).
    flush_pair(&mut engine, ("c", b"3"), ("d", b"4"));
    assert_eq!(engine.table_count_at(1), 0, "sources deleted");
    assert_eq!(engine.table_count_at(2), 1, "single merged table at level 2");

    for (k, v) in [("a", b"1"), ("b", b"2"), ("c", b"3"), ("d", b"4")] {
        assert_eq!(engine.get(k).unwrap().unwrap(), v);
    }
}

#[test]
fn compaction_deletes_source_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with_count_trigger(dir.path(), 2);

    flush_pair(&mut engine, ("a", b"1"), ("b", b"2"));
    flush_pair(&mut engine, ("c", b"3"), ("d", b"4"));

    let ids = sstable::list_tables(&dir.path().join("sstable")).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].level, 2);
}

#[test]
fn merge_keeps_exactly_the_newest_version() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with_count_trigger(dir.path(), 2);

    flush_pair(&mut engine, ("k", b"old"), ("other", b"x"));
    flush_pair(&mut engine, ("k", b"new"), ("pad", b"y"));

    assert_eq!(engine.table_count_at(2), 1);
    assert_eq!(engine.get("k").unwrap().unwrap(), b"new");

    // Physically verify the merged table holds one "k", the newest.
    let sst_dir = dir.path().join("sstable");
    let id = sstable::list_tables(&sst_dir).unwrap()[0];
    let table = Table::open(&sst_dir, id).unwrap();
    let rec = table.search("k", None).unwrap().unwrap();
    assert_eq!(rec.value, b"new");
    assert_eq!(table.key_range().unwrap().0, "k");
}

#[test]
fn agreed_deleted_key_vanishes_from_the_deepest_merge() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with_count_trigger(dir.path(), 2);

    // Table 1: k alive. Then delete it and sink the tombstone into
    // table 2. The merge target (level 2) has nothing deeper, so the
    // tombstone itself must be collected.
    flush_pair(&mut engine, ("k", b"doomed"), ("keep", b"1"));
    engine.delete("k").unwrap();
    engine.put("pad", b"x").unwrap();
    engine.flush_all().unwrap();

    assert_eq!(engine.table_count_at(2), 1);
    assert!(engine.get("k").unwrap().is_none());

    let sst_dir = dir.path().join("sstable");
    let id = sstable::list_tables(&sst_dir).unwrap()[0];
    let table = Table::open(&sst_dir, id).unwrap();
    assert!(
        table.search("k", None).unwrap().is_none(),
        "neither value nor tombstone survives the deepest merge"
    );
    assert!(table.search("keep", None).unwrap().is_some());
}

#[test]
fn tombstone_survives_while_deeper_data_exists() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = small_cfg(dir.path());
    cfg.level_table_limit = 2;
    cfg.levels = 4;
    let mut engine = Engine::open(cfg).unwrap();

    // Sink k=old all the way to level 2.
    flush_pair(&mut engine, ("k", b"old"), ("a", b"1"));
    flush_pair(&mut engine, ("b", b"2"), ("c", b"3"));
    assert_eq!(engine.table_count_at(2), 1);

    // Now delete k and compact level 1 again: the tombstone's merge
    // target already holds k=old in another table, so it must survive.
    engine.delete("k").unwrap();
    engine.put("pad1", b"x").unwrap();
    engine.flush_all().unwrap();
    flush_pair(&mut engine, ("pad2", b"y"), ("pad3", b"z"));

    assert!(engine.get("k").unwrap().is_none(), "delete still wins");

    let sst_dir = dir.path().join("sstable");
    let mut tomb_found = false;
    for id in sstable::list_tables(&sst_dir).unwrap() {
        let table = Table::open(&sst_dir, id).unwrap();
        if let Some(rec) = table.search("k", None).unwrap() {
            if rec.tombstone {
                tomb_found = true;
                break;
            }
        }
    }
    assert!(tomb_found, "tombstone must keep shadowing deeper data");
}

#[test]
fn byte_trigger_fires_on_cumulative_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = small_cfg(dir.path());
    cfg.compaction_trigger = CompactionTrigger::Bytes;
    cfg.level_byte_limit = 64; // two small tables exceed this
    let mut engine = Engine::open(cfg).unwrap();

    flush_pair(&mut engine, ("a", b"1"), ("b", b"2"));
    assert_eq!(engine.table_count_at(2), 0);
    flush_pair(&mut engine, ("c", b"3"), ("d", b"4"));

    assert_eq!(engine.table_count_at(1), 0);
    assert_eq!(engine.table_count_at(2), 1);
}

#[test]
fn leveled_strategy_merges_overlapping_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = small_cfg(dir.path());
    cfg.compaction_strategy = CompactionStrategy::Leveled;
    cfg.level_table_limit = 2;
    let mut engine = Engine::open(cfg).unwrap();

    flush_pair(&mut engine, ("a", b"1"), ("m", b"old"));
    flush_pair(&mut engine, ("m", b"new"), ("z", b"2"));

    // Both level-1 tables overlapped around "m"; everything now lives at
    // level 2 with the newest "m".
    assert_eq!(engine.table_count_at(1), 0);
    assert!(engine.table_count_at(2) >= 1);
    assert_eq!(engine.get("m").unwrap().unwrap(), b"new");
    assert_eq!(engine.get("a").unwrap().unwrap(), b"1");
    assert_eq!(engine.get("z").unwrap().unwrap(), b"2");
}

#[test]
fn deeper_levels_tolerate_proportionally_more() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with_count_trigger(dir.path(), 2);

    // Four pairs: two L1 merges produce two L2 tables. Level 2's
    // threshold is 2 × 2 = 4 tables, so they must NOT merge further yet.
    flush_pair(&mut engine, ("a", b"1"), ("b", b"2"));
    flush_pair(&mut engine, ("c", b"3"), ("d", b"4"));
    flush_pair(&mut engine, ("e", b"5"), ("f", b"6"));
    flush_pair(&mut engine, ("g", b"7"), ("h", b"8"));

    assert_eq!(engine.table_count_at(2), 2);
    assert_eq!(engine.table_count_at(3), 0);
}
