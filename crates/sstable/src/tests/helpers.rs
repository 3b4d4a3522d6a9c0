use config::Config;
use record::{KeyDictionary, Record};
use std::path::Path;

use crate::{TableBuilder, TableId};

/// Config with intervals small enough that a handful of records exercises
/// every narrowing stage.
pub fn small_cfg() -> Config {
    let mut cfg = Config::default();
    cfg.index_interval = 2;
    cfg.summary_interval = 2;
    cfg
}

/// A record with a pinned timestamp, for deterministic merge outcomes.
pub fn rec(key: &str, value: &[u8], timestamp: i64) -> Record {
    Record {
        timestamp,
        tombstone: false,
        key: key.to_string(),
        value: value.to_vec(),
    }
}

/// A tombstone with a pinned timestamp.
pub fn tomb(key: &str, timestamp: i64) -> Record {
    Record {
        timestamp,
        tombstone: true,
        key: key.to_string(),
        value: Vec::new(),
    }
}

/// Builds a table from pre-sorted records with the small config.
pub fn build_table(dir: &Path, id: TableId, records: Vec<Record>) {
    let cfg = small_cfg();
    let mut dict = KeyDictionary::new();
    let count = records.len();
    TableBuilder::build(dir, id, count, records, &cfg, &mut dict).unwrap();
}

/// `n` records keyed `key000..` with timestamp = index.
pub fn numbered_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| rec(&format!("key{:03}", i), format!("value-{i}").as_bytes(), i as i64))
        .collect()
}
