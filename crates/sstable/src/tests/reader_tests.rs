use super::helpers::{build_table, numbered_records, rec, small_cfg, tomb};
use crate::{Table, TableBuilder, TableFile, TableId};
use record::KeyDictionary;

#[test]
fn every_written_key_is_found_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    let records = numbered_records(60);
    build_table(dir.path(), id, records.clone());

    let table = Table::open(dir.path(), id).unwrap();
    for expected in &records {
        let found = table.search(&expected.key, None).unwrap().unwrap();
        assert_eq!(&found, expected);
    }
}

#[test]
fn absent_keys_between_and_beyond_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    build_table(dir.path(), id, numbered_records(20));

    let table = Table::open(dir.path(), id).unwrap();
    // Sorts between key000 and key001 — the data scan must stop at a
    // greater key, never return a neighbor.
    assert!(table.search("key0005", None).unwrap().is_none());
    assert!(table.search("aaaaa", None).unwrap().is_none());
    assert!(table.search("zzzzz", None).unwrap().is_none());
}

#[test]
fn tombstones_are_returned_not_hidden() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    build_table(
        dir.path(),
        id,
        vec![rec("alive", b"v", 1), tomb("dead", 2)],
    );

    let table = Table::open(dir.path(), id).unwrap();
    let dead = table.search("dead", None).unwrap().unwrap();
    assert!(dead.tombstone);
    let alive = table.search("alive", None).unwrap().unwrap();
    assert!(!alive.tombstone);
}

#[test]
fn compressed_table_round_trips_through_its_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    let mut cfg = small_cfg();
    cfg.key_compression = true;

    let records = numbered_records(30);
    let mut dict = KeyDictionary::new();
    TableBuilder::build(dir.path(), id, records.len(), records.clone(), &cfg, &mut dict)
        .unwrap();

    let table = Table::open(dir.path(), id).unwrap();
    for expected in &records {
        let found = table.search(&expected.key, Some(&dict)).unwrap().unwrap();
        assert_eq!(&found, expected);
    }
}

#[test]
fn corrupt_record_is_a_hole_for_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    let records = numbered_records(6);
    build_table(dir.path(), id, records.clone());

    // Corrupt key001's value byte: its frame follows key000's.
    let data_path = id.path(dir.path(), TableFile::Data);
    let mut data = std::fs::read(&data_path).unwrap();
    let first = records[0].encoded_len(false) as usize;
    let second = records[1].encoded_len(false) as usize;
    data[first + second - 1] ^= 0xFF;
    std::fs::write(&data_path, &data).unwrap();

    let table = Table::open(dir.path(), id).unwrap();
    // The corrupt record reads as absent...
    assert!(table.search("key001", None).unwrap().is_none());
    // ...while its neighbors survive.
    assert!(table.search("key000", None).unwrap().is_some());
    assert!(table.search("key002", None).unwrap().is_some());
}

#[test]
fn verify_accepts_untouched_tables() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    build_table(dir.path(), id, numbered_records(25));

    let table = Table::open(dir.path(), id).unwrap();
    table.verify(None).unwrap();
}

#[test]
fn verify_rejects_an_altered_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    let records = numbered_records(25);
    build_table(dir.path(), id, records.clone());

    // Rewrite one value byte AND fix up that record's CRC so the per-record
    // check passes — only the hash tree can catch this.
    let data_path = id.path(dir.path(), TableFile::Data);
    let mut data = std::fs::read(&data_path).unwrap();
    let mut tampered = records[0].clone();
    tampered.value = b"EVIL-ed".to_vec();
    let mut frame = Vec::new();
    tampered.write_to(&mut frame).unwrap();
    assert_eq!(frame.len() as u64, records[0].encoded_len(false));
    data[..frame.len()].copy_from_slice(&frame);
    std::fs::write(&data_path, &data).unwrap();

    let table = Table::open(dir.path(), id).unwrap();
    assert!(table.verify(None).is_err());
}

#[test]
fn key_range_spans_first_to_last() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    build_table(dir.path(), id, numbered_records(33));

    let table = Table::open(dir.path(), id).unwrap();
    let (lo, hi) = table.key_range().unwrap();
    assert_eq!(lo, "key000");
    assert_eq!(hi, "key032");
}

#[test]
fn delete_removes_every_companion_file() {
    let dir = tempfile::tempdir().unwrap();
    let id = TableId { level: 1, seq: 1 };
    build_table(dir.path(), id, numbered_records(5));

    let table = Table::open(dir.path(), id).unwrap();
    table.delete().unwrap();

    for file in TableFile::ALL {
        assert!(!id.path(dir.path(), file).exists());
    }
    assert!(crate::list_tables(dir.path()).unwrap().is_empty());
}
