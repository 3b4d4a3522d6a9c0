//! # Config — SiltKV engine configuration
//!
//! Every tunable threshold in the engine lives here, loaded from a single
//! JSON file. A missing file yields the defaults; a present file is parsed
//! and then sanitized so that zeroed or nonsensical values fall back to
//! their defaults instead of wedging the engine (an `index_interval` of 0
//! would otherwise divide by zero on the first flush).
//!
//! ## Example
//!
//! ```rust,no_run
//! use config::Config;
//!
//! let cfg = Config::load_or_init("silt.json").unwrap();
//! assert!(cfg.memtable_capacity > 0);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or persisting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file exists but is not valid JSON for [`Config`].
    #[error("malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which ordered structure backs the memtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemtableBackend {
    /// Probabilistic skip list (default).
    Skiplist,
    /// Order-m B-tree.
    Btree,
}

/// What a level is measured by when deciding whether to compact it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionTrigger {
    /// Cumulative byte size of the level's SSTable data files.
    Bytes,
    /// Number of SSTables at the level.
    Count,
}

/// How same-level SSTables are merged into the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStrategy {
    /// Merge every table at level L into one table at L+1 (production path).
    SizeTiered,
    /// Merge each L table with its key-range overlaps at L+1.
    Leveled,
}

/// The complete engine configuration.
///
/// Serialized as JSON with `serde`; unknown fields are rejected so a typo in
/// the file surfaces as a parse error rather than a silently ignored knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Root directory for all persisted state (WAL segments, SSTables,
    /// key dictionary, sequence counter).
    pub data_dir: PathBuf,

    // ---- LSM levels / compaction ----
    /// Number of SSTable levels (1..=levels).
    pub levels: usize,
    /// Trigger policy checked per level after each flush.
    pub compaction_trigger: CompactionTrigger,
    /// Merge strategy once a trigger fires.
    pub compaction_strategy: CompactionStrategy,
    /// Base byte threshold; level L compacts at `level_byte_limit * L`.
    pub level_byte_limit: u64,
    /// Base table-count threshold; level L compacts at `level_table_limit * L`.
    pub level_table_limit: usize,

    // ---- WAL ----
    /// Maximum size of one WAL segment file in bytes.
    pub wal_segment_size: u64,

    // ---- SSTable ----
    /// One sparse-index entry per this many data records.
    pub index_interval: usize,
    /// One summary entry per this many index entries.
    pub summary_interval: usize,
    /// Target false-positive rate for each table's bloom filter.
    pub bloom_fpr: f64,
    /// Store dictionary-compressed keys in SSTable data files.
    pub key_compression: bool,

    // ---- Memtable ----
    /// Hard capacity of one memtable, in distinct keys.
    pub memtable_capacity: usize,
    /// Size of the memtable ring (1 active + N-1 retired).
    pub memtable_count: usize,
    /// Backing structure for every memtable.
    pub memtable_backend: MemtableBackend,
    /// Maximum tower height for the skip-list backend.
    pub skiplist_max_height: usize,
    /// Order m for the B-tree backend (max children per node).
    pub btree_order: usize,

    // ---- Engine extras ----
    /// Entry capacity of the recency cache.
    pub cache_capacity: usize,
    /// Token-bucket burst capacity.
    pub limiter_capacity: u64,
    /// Token-bucket refill rate, tokens per second.
    pub limiter_rate: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            levels: 4,
            compaction_trigger: CompactionTrigger::Count,
            compaction_strategy: CompactionStrategy::SizeTiered,
            level_byte_limit: 4 * 1024 * 1024,
            level_table_limit: 4,
            wal_segment_size: 1024 * 1024,
            index_interval: 16,
            summary_interval: 8,
            bloom_fpr: 0.01,
            key_compression: false,
            memtable_capacity: 1024,
            memtable_count: 2,
            memtable_backend: MemtableBackend::Skiplist,
            skiplist_max_height: 12,
            btree_order: 16,
            cache_capacity: 256,
            limiter_capacity: 64,
            limiter_rate: 16,
        }
    }
}

impl Config {
    /// Loads the configuration from `path`.
    ///
    /// A missing file is not an error — the defaults are returned. A present
    /// but malformed file is a [`ConfigError::Parse`]. Values are sanitized
    /// after parsing (see [`sanitize`](Config::sanitize)).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let mut cfg: Config = serde_json::from_str(&raw)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Like [`load`](Config::load), but writes the default file when none
    /// exists so the operator has something to edit.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let cfg = Self::default();
            cfg.save(path)?;
            return Ok(cfg);
        }
        Self::load(path)
    }

    /// Persists the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Clamps zeroed or out-of-range values back to their defaults.
    ///
    /// The engine divides by `index_interval` and `summary_interval`, walks
    /// rings of `memtable_count` tables, and sizes bloom filters from
    /// `bloom_fpr` — a zero in any of them is an operator mistake, not a
    /// request to disable the feature.
    pub fn sanitize(&mut self) {
        let d = Config::default();
        if self.levels == 0 {
            self.levels = d.levels;
        }
        if self.level_byte_limit == 0 {
            self.level_byte_limit = d.level_byte_limit;
        }
        if self.level_table_limit < 2 {
            self.level_table_limit = d.level_table_limit;
        }
        if self.wal_segment_size == 0 {
            self.wal_segment_size = d.wal_segment_size;
        }
        if self.index_interval == 0 {
            self.index_interval = d.index_interval;
        }
        if self.summary_interval == 0 {
            self.summary_interval = d.summary_interval;
        }
        if !(self.bloom_fpr > 0.0 && self.bloom_fpr < 1.0) {
            self.bloom_fpr = d.bloom_fpr;
        }
        if self.memtable_capacity == 0 {
            self.memtable_capacity = d.memtable_capacity;
        }
        if self.memtable_count == 0 {
            self.memtable_count = d.memtable_count;
        }
        if self.skiplist_max_height == 0 {
            self.skiplist_max_height = d.skiplist_max_height;
        }
        // An order below 3 cannot split: a node must hold at least two keys.
        if self.btree_order < 3 {
            self.btree_order = d.btree_order;
        }
        if self.cache_capacity == 0 {
            self.cache_capacity = d.cache_capacity;
        }
        if self.limiter_capacity == 0 {
            self.limiter_capacity = d.limiter_capacity;
        }
        if self.limiter_rate == 0 {
            self.limiter_rate = d.limiter_rate;
        }
    }

    /// Directory holding the WAL segment files.
    #[must_use]
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// Directory holding every SSTable's five companion files.
    #[must_use]
    pub fn sstable_dir(&self) -> PathBuf {
        self.data_dir.join("sstable")
    }

    /// Path of the persisted key-compression dictionary.
    #[must_use]
    pub fn dictionary_path(&self) -> PathBuf {
        self.data_dir.join("key_dict.db")
    }

    /// Path of the persisted SSTable sequence counter.
    #[must_use]
    pub fn counter_path(&self) -> PathBuf {
        self.data_dir.join("SEQUENCE")
    }
}
