//! # Engine — SiltKV orchestration
//!
//! The central piece that ties the [`wal`], [`memtable`] and [`sstable`]
//! crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Caller (CLI, tests)
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────┐
//! │                       ENGINE                         │
//! │                                                      │
//! │ write.rs → WAL append → memtable ring insert         │
//! │               |                                      │
//! │               | (next ring slot full as well?)       │
//! │               v          yes                         │
//! │         flush slot → WAL truncate → level-1 table    │
//! │               |                                      │
//! │               v                                      │
//! │ compaction.rs → per-level triggers → merge to L+1    │
//! │                                                      │
//! │ read.rs → memtable ring → cache → tables             │
//! │            (any hit ends the search; a tombstone     │
//! │             means definitely deleted)                │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module          | Purpose                                           |
//! |-----------------|---------------------------------------------------|
//! | `lib.rs`        | `Engine` struct, constructor, accessors, `Drop`   |
//! | [`recovery`]    | WAL replay through the ring at startup            |
//! | [`write`]       | `put()`, `delete()`, ring rotation, flush         |
//! | [`read`]        | `get()`, paginated prefix / range scans           |
//! | [`compaction`]  | per-level triggers, size-tiered + leveled merges  |
//! | [`levels`]      | table registry + persisted sequence counter       |
//! | [`cache`]       | bounded LRU consulted between memtables and disk  |
//! | [`limiter`]     | token bucket the caller gates commands through    |
//!
//! ## Crash safety
//!
//! Every mutation reaches the WAL before the memtable. The WAL is
//! truncated only after the level-1 table build succeeds, so a crash
//! mid-flush replays the lost memtable from the log. Tables and the
//! sequence counter are published with tmp + rename.
//!
//! ## Concurrency model
//!
//! Single writer, synchronous: every mutating operation takes `&mut self`,
//! which makes the external single-writer discipline explicit in the type
//! system. No internal locking anywhere.

mod cache;
mod compaction;
mod levels;
mod limiter;
mod read;
mod recovery;
mod write;

pub use cache::RecencyCache;
pub use limiter::TokenBucket;

use anyhow::Result;
use config::Config;
use levels::Levels;
use memtable::Memtable;
use record::KeyDictionary;
use tracing::info;
use wal::Wal;

/// The storage engine: one per data directory, one logical writer.
pub struct Engine {
    cfg: Config,
    wal: Wal,
    /// Ring of memtables; `active` receives writes, the rest are retired
    /// and read-only until their slot is flushed.
    memtables: Vec<Memtable>,
    active: usize,
    cache: RecencyCache,
    /// Process-wide key-compression dictionary; loaded at startup,
    /// persisted after every table build and on drop.
    dict: KeyDictionary,
    levels: Levels,
    limiter: TokenBucket,
}

impl Engine {
    /// Opens (or creates) the store under `cfg.data_dir` and recovers:
    /// tables are re-listed and integrity-checked, the key dictionary is
    /// loaded, and the WAL is replayed through the memtable ring in
    /// original write order.
    pub fn open(cfg: Config) -> Result<Self> {
        std::fs::create_dir_all(&cfg.data_dir)?;

        let wal = Wal::open(cfg.wal_dir(), cfg.wal_segment_size)?;
        let dict = KeyDictionary::load(cfg.dictionary_path())?;
        let dict_ref = cfg.key_compression.then_some(&dict);
        let levels = Levels::open(cfg.sstable_dir(), cfg.counter_path(), dict_ref)?;
        let memtables = (0..cfg.memtable_count).map(|_| Memtable::new(&cfg)).collect();
        let cache = RecencyCache::new(cfg.cache_capacity);
        let limiter = TokenBucket::new(cfg.limiter_capacity, cfg.limiter_rate);

        let mut engine = Self {
            cfg,
            wal,
            memtables,
            active: 0,
            cache,
            dict,
            levels,
            limiter,
        };
        engine.recover()?;
        info!(
            tables = engine.levels.len(),
            wal_segments = engine.wal.segment_count(),
            "engine opened"
        );
        Ok(engine)
    }

    /// One token from the admission bucket; `false` means the caller
    /// should back off and retry — engine operations themselves never
    /// block or consume tokens.
    pub fn admit(&mut self) -> bool {
        self.limiter.take()
    }

    /// The configuration this engine was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Number of live SSTables across all levels.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of live SSTables at one level.
    #[must_use]
    pub fn table_count_at(&self, level: usize) -> usize {
        self.levels.tables_at(level).count()
    }

    /// Distinct keys resident across the whole memtable ring.
    #[must_use]
    pub fn resident_keys(&self) -> usize {
        self.memtables.iter().map(Memtable::len).sum()
    }

    /// Total bytes currently held by the write-ahead log.
    pub fn wal_total_bytes(&self) -> Result<u64> {
        Ok(self.wal.total_bytes()?)
    }

    pub(crate) fn dict_ref(&self) -> Option<&KeyDictionary> {
        self.cfg.key_compression.then_some(&self.dict)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("active_memtable", &self.active)
            .field("memtable_count", &self.memtables.len())
            .field("resident_keys", &self.resident_keys())
            .field("tables", &self.levels.len())
            .field("wal_segments", &self.wal.segment_count())
            .field("dictionary_keys", &self.dict.len())
            .finish()
    }
}

/// Persist the key dictionary on shutdown. Data durability never depends
/// on this — the dictionary is also saved after every table build, and
/// everything else lives in the WAL.
impl Drop for Engine {
    fn drop(&mut self) {
        if self.cfg.key_compression {
            let _ = self.dict.save(self.cfg.dictionary_path());
        }
    }
}
