//! Write path: `put()`, `delete()`, ring rotation and flush.
//!
//! Every mutation is appended to the WAL first; the record the WAL
//! constructed is then mirrored into the memtable ring and the cache, so
//! all three always carry the same timestamp.
//!
//! A refused insert rotates the ring to the next slot. When that slot is
//! full as well — "full twice in a row" — it is drained: the WAL is
//! truncated by exactly the drained records' byte footprint, the records
//! become a level-1 SSTable, compaction is re-evaluated, and the emptied
//! slot becomes the new active memtable.

use anyhow::{bail, ensure, Result};
use record::{Record, MAX_KEY_BYTES, MAX_VALUE_BYTES};
use sstable::{Table, TableBuilder};
use tracing::info;

use crate::Engine;

impl Engine {
    /// Inserts or updates `key`.
    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() as u64 <= MAX_KEY_BYTES,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_BYTES
        );
        ensure!(
            value.len() as u64 <= MAX_VALUE_BYTES,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_BYTES
        );

        let rec = self.wal.append(key, value, false)?;
        self.cache.set(rec.clone());
        self.insert_to_ring(rec)
    }

    /// Deletes `key`. Deleting a key that is not live anywhere is an
    /// error surfaced to the caller (a `get` miss is not).
    pub fn delete(&mut self, key: &str) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        if self.get(key)?.is_none() {
            bail!("key not found: {key}");
        }

        let tomb = self.wal.append(key, &[], true)?;

        // If the key is resident in some live memtable, flip that record
        // in place; otherwise a fresh tombstone goes through the ring.
        let count = self.memtables.len();
        let mut flipped = false;
        for offset in 0..count {
            let idx = (self.active + count - offset) % count;
            if self.memtables[idx].delete(key, tomb.timestamp) {
                flipped = true;
                break;
            }
        }
        self.cache.set(tomb.clone());
        if !flipped {
            self.insert_to_ring(tomb)?;
        }
        Ok(())
    }

    /// Inserts an already-logged record into the ring. Also the replay
    /// path — recovery feeds WAL records straight through here.
    ///
    /// A refusal rotates to the next slot; if the slot **after** the new
    /// active one is full as well (full twice in a row around the ring),
    /// that slot is drained to disk now. The invariant this keeps: the
    /// slot a future rotation will land on has always been flushed
    /// already, so the retry below cannot be refused.
    pub(crate) fn insert_to_ring(&mut self, rec: Record) -> Result<()> {
        let rec = match self.memtables[self.active].insert(rec) {
            Ok(()) => return Ok(()),
            Err(rec) => rec,
        };

        self.active = (self.active + 1) % self.memtables.len();
        let ahead = (self.active + 1) % self.memtables.len();
        if self.memtables[ahead].is_full() {
            self.flush_slot(ahead)?;
        }

        self.memtables[self.active]
            .insert(rec)
            .map_err(|rec| anyhow::anyhow!("rotated memtable refused key {:?}", rec.key))
    }

    /// Drains ring slot `slot` into a new level-1 table.
    ///
    /// Ordering is what makes a crash here recoverable: the table is built
    /// and published first, and only then is the WAL truncated — a crash
    /// in between replays the records into the ring again, at worst
    /// rebuilding state the table already holds.
    fn flush_slot(&mut self, slot: usize) -> Result<()> {
        let wal_bytes = self.memtables[slot].wal_bytes();
        let records = self.memtables[slot].flush();
        if records.is_empty() {
            return Ok(());
        }

        let id = self.levels.allocate(1)?;
        TableBuilder::build(
            self.levels.dir(),
            id,
            records.len(),
            records,
            &self.cfg,
            &mut self.dict,
        )?;
        if self.cfg.key_compression {
            self.dict.save(self.cfg.dictionary_path())?;
        }

        self.wal.truncate(wal_bytes)?;

        let table = Table::open(self.levels.dir(), id)?;
        self.levels.register(table);
        info!(seq = id.seq, wal_bytes, "memtable flushed to level 1");

        self.maybe_compact()
    }

    /// Drains every non-empty ring slot to disk (shutdown aid and test
    /// hook; the engine never needs it for correctness).
    pub fn flush_all(&mut self) -> Result<()> {
        for slot in 0..self.memtables.len() {
            if !self.memtables[slot].is_empty() {
                self.flush_slot(slot)?;
            }
        }
        Ok(())
    }
}
