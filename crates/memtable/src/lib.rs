//! # Memtable — bounded in-memory sorted index
//!
//! Every write lands here (after the WAL) and stays until the table is
//! drained to an SSTable. The ordered structure underneath is chosen once,
//! at construction, from configuration: a probabilistic skip list or an
//! order-m B-tree. Both live behind [`MemtableCore`], a tagged enum, so
//! call sites never see the choice and there is no virtual dispatch.
//!
//! Capacity is measured in **distinct keys** and enforced by the engine,
//! not here: [`Memtable::insert`] reports `false` when the table is full
//! and the key is new, which is the engine's signal to rotate the ring and
//! possibly flush. Updates of resident keys are always accepted.
//!
//! Each memtable also tracks the WAL byte footprint of the records it
//! accepted ([`Memtable::wal_bytes`]); after this table flushes, exactly
//! that many bytes are reclaimed from the log.

mod btree;
mod skiplist;

pub use btree::BTree;
pub use skiplist::SkipList;

use config::{Config, MemtableBackend};
use record::Record;

/// The two interchangeable ordered backends.
#[derive(Debug)]
pub enum MemtableCore {
    SkipList(SkipList),
    BTree(BTree),
}

/// A bounded, ordered key → [`Record`] map.
#[derive(Debug)]
pub struct Memtable {
    core: MemtableCore,
    capacity: usize,
    wal_bytes: u64,
}

impl Memtable {
    /// Builds a memtable with the backend and limits named in `cfg`.
    #[must_use]
    pub fn new(cfg: &Config) -> Self {
        let core = match cfg.memtable_backend {
            MemtableBackend::Skiplist => {
                MemtableCore::SkipList(SkipList::new(cfg.skiplist_max_height))
            }
            MemtableBackend::Btree => MemtableCore::BTree(BTree::new(cfg.btree_order)),
        };
        Self {
            core,
            capacity: cfg.memtable_capacity,
            wal_bytes: 0,
        }
    }

    /// Number of distinct keys resident (tombstones included).
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.core {
            MemtableCore::SkipList(s) => s.len(),
            MemtableCore::BTree(b) => b.len(),
        }
    }

    /// Returns `true` if no key is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the distinct-key capacity is reached.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Serialized WAL footprint of every record accepted so far.
    #[must_use]
    pub fn wal_bytes(&self) -> u64 {
        self.wal_bytes
    }

    /// Looks up a key; tombstoned records are returned like any other —
    /// interpreting them is the engine's job.
    #[must_use]
    pub fn search(&self, key: &str) -> Option<&Record> {
        match &self.core {
            MemtableCore::SkipList(s) => s.search(key),
            MemtableCore::BTree(b) => b.search(key),
        }
    }

    /// Inserts or updates. An update of a resident key is always accepted
    /// and counts toward capacity only once. A new key on a full table is
    /// refused: the record comes back in `Err`, which is the engine's
    /// signal to rotate the ring (and possibly flush) and retry there.
    pub fn insert(&mut self, rec: Record) -> Result<(), Record> {
        let resident = self.search(&rec.key).is_some();
        if !resident && self.is_full() {
            return Err(rec);
        }
        let bytes = rec.encoded_len(false);
        match &mut self.core {
            MemtableCore::SkipList(s) => s.insert(rec),
            MemtableCore::BTree(b) => b.insert(rec),
        }
        self.wal_bytes += bytes;
        Ok(())
    }

    /// Flips the resident record for `key` into a tombstone in place,
    /// stamping it with `timestamp` (the WAL tombstone's timestamp, so the
    /// two stay consistent). Returns `false` when the key is not resident —
    /// the caller then inserts a fresh tombstone record instead.
    pub fn delete(&mut self, key: &str, timestamp: i64) -> bool {
        let rec = match &mut self.core {
            MemtableCore::SkipList(s) => s.search_mut(key),
            MemtableCore::BTree(b) => b.search_mut(key),
        };
        match rec {
            Some(rec) => {
                rec.tombstone = true;
                rec.value.clear();
                rec.timestamp = timestamp;
                // The tombstone that was appended to the WAL for this
                // deletion belongs to this memtable's byte budget.
                let bytes = rec.encoded_len(false);
                self.wal_bytes += bytes;
                true
            }
            None => false,
        }
    }

    /// Destructively drains the table: every record, ascending key order.
    /// The structure is empty afterward and the WAL byte counter is reset
    /// (the engine truncates the log with the returned records' footprint).
    pub fn flush(&mut self) -> Vec<Record> {
        self.wal_bytes = 0;
        match &mut self.core {
            MemtableCore::SkipList(s) => s.flush(),
            MemtableCore::BTree(b) => b.flush(),
        }
    }

    /// Ascending-key iteration without draining.
    pub fn iter(&self) -> MemtableIter<'_> {
        match &self.core {
            MemtableCore::SkipList(s) => MemtableIter::SkipList(s.iter()),
            MemtableCore::BTree(b) => MemtableIter::BTree(b.iter()),
        }
    }
}

/// Ascending iterator over a memtable, one variant per backend.
pub enum MemtableIter<'a> {
    SkipList(skiplist::SkipListIter<'a>),
    BTree(btree::BTreeIter<'a>),
}

impl<'a> Iterator for MemtableIter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            MemtableIter::SkipList(it) => it.next(),
            MemtableIter::BTree(it) => it.next(),
        }
    }
}
