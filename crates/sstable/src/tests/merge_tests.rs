use super::helpers::{build_table, rec, tomb};
use crate::{StreamMerger, Table, TableId};

fn open(dir: &std::path::Path, id: TableId) -> Table {
    Table::open(dir, id).unwrap()
}

#[test]
fn merge_interleaves_disjoint_tables() {
    let dir = tempfile::tempdir().unwrap();
    let a = TableId { level: 1, seq: 2 };
    let b = TableId { level: 1, seq: 1 };
    build_table(dir.path(), a, vec![rec("a", b"1", 1), rec("c", b"3", 1)]);
    build_table(dir.path(), b, vec![rec("b", b"2", 1), rec("d", b"4", 1)]);

    let ta = open(dir.path(), a);
    let tb = open(dir.path(), b);
    let mut merger = StreamMerger::new(vec![
        ta.stream(None).unwrap(),
        tb.stream(None).unwrap(),
    ]);

    let keys: Vec<String> = merger
        .collect_all()
        .unwrap()
        .into_iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(keys, vec!["a", "b", "c", "d"]);
}

#[test]
fn newest_timestamp_wins_on_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let newer = TableId { level: 1, seq: 2 };
    let older = TableId { level: 1, seq: 1 };
    build_table(
        dir.path(),
        newer,
        vec![rec("k", b"new", 20), rec("only-new", b"x", 21)],
    );
    build_table(
        dir.path(),
        older,
        vec![rec("k", b"old", 10), rec("only-old", b"y", 11)],
    );

    let tn = open(dir.path(), newer);
    let to = open(dir.path(), older);
    let mut merger = StreamMerger::new(vec![
        tn.stream(None).unwrap(),
        to.stream(None).unwrap(),
    ]);

    let merged = merger.collect_all().unwrap();
    assert_eq!(merged.len(), 3, "one record per distinct key");

    let k = merged.iter().find(|r| r.key == "k").unwrap();
    assert_eq!(k.value, b"new");
    assert!(merged.iter().any(|r| r.key == "only-new"));
    assert!(merged.iter().any(|r| r.key == "only-old"));
}

#[test]
fn exact_timestamp_tie_resolves_to_the_first_stream() {
    let dir = tempfile::tempdir().unwrap();
    let newer = TableId { level: 1, seq: 2 };
    let older = TableId { level: 1, seq: 1 };
    build_table(dir.path(), newer, vec![rec("k", b"from-newer", 5)]);
    build_table(dir.path(), older, vec![rec("k", b"from-older", 5)]);

    let tn = open(dir.path(), newer);
    let to = open(dir.path(), older);
    // Streams are passed newest table first; the tie goes to it.
    let mut merger = StreamMerger::new(vec![
        tn.stream(None).unwrap(),
        to.stream(None).unwrap(),
    ]);

    let merged = merger.collect_all().unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].value, b"from-newer");
}

#[test]
fn tombstone_can_be_the_winning_version() {
    let dir = tempfile::tempdir().unwrap();
    let newer = TableId { level: 1, seq: 2 };
    let older = TableId { level: 1, seq: 1 };
    build_table(dir.path(), newer, vec![tomb("k", 20)]);
    build_table(dir.path(), older, vec![rec("k", b"old", 10)]);

    let tn = open(dir.path(), newer);
    let to = open(dir.path(), older);
    let mut merger = StreamMerger::new(vec![
        tn.stream(None).unwrap(),
        to.stream(None).unwrap(),
    ]);

    let merged = merger.collect_all().unwrap();
    assert_eq!(merged.len(), 1);
    assert!(
        merged[0].tombstone,
        "the merge keeps the newest version; GC policy is the engine's call"
    );
}

#[test]
fn three_way_merge_with_chained_supersession() {
    let dir = tempfile::tempdir().unwrap();
    let ids = [
        TableId { level: 1, seq: 3 },
        TableId { level: 1, seq: 2 },
        TableId { level: 1, seq: 1 },
    ];
    build_table(dir.path(), ids[0], vec![rec("a", b"a3", 30), rec("m", b"m3", 31)]);
    build_table(dir.path(), ids[1], vec![rec("a", b"a2", 20), rec("z", b"z2", 21)]);
    build_table(dir.path(), ids[2], vec![rec("a", b"a1", 10), rec("m", b"m1", 11)]);

    let tables: Vec<Table> = ids.iter().map(|id| open(dir.path(), *id)).collect();
    let streams = tables
        .iter()
        .map(|t| t.stream(None).unwrap())
        .collect::<Vec<_>>();
    let mut merger = StreamMerger::new(streams);

    let merged = merger.collect_all().unwrap();
    let pairs: Vec<(String, Vec<u8>)> =
        merged.into_iter().map(|r| (r.key, r.value)).collect();
    assert_eq!(
        pairs,
        vec![
            ("a".to_string(), b"a3".to_vec()),
            ("m".to_string(), b"m3".to_vec()),
            ("z".to_string(), b"z2".to_vec()),
        ]
    );
}
