//! Compaction: per-level triggers and the two merge strategies.
//!
//! After every flush the levels are re-checked. A level L is due when it
//! holds at least two tables and exceeds its threshold — the configured
//! base (bytes or table count) **times L**, so deeper levels tolerate
//! proportionally more data.
//!
//! * **Size-tiered** (production path): every table at L is merged into a
//!   single table at L+1 in one multi-way pass, then the sources are
//!   deleted. Checking continues downward, so a merge that overfills L+1
//!   cascades naturally.
//! * **Leveled**: each table at L is merged with the tables at L+1 whose
//!   key ranges overlap it; the merged stream is re-split into tables at
//!   L+1 bounded by the byte limit.
//!
//! Tombstone collection: a winning tombstone is dropped from the output
//! only when no level deeper than the merge target holds any table —
//! otherwise it must survive to keep shadowing older versions.

use anyhow::Result;
use config::{CompactionStrategy, CompactionTrigger};
use record::Record;
use sstable::{StreamMerger, Table, TableBuilder, TableId};
use tracing::info;

use crate::Engine;

impl Engine {
    /// Re-evaluates every level against its trigger and compacts the ones
    /// that are due. Called after each flush; callable directly.
    pub fn maybe_compact(&mut self) -> Result<()> {
        // The last level has nowhere to promote to.
        for level in 1..self.cfg.levels {
            if !self.level_is_due(level)? {
                continue;
            }
            match self.cfg.compaction_strategy {
                CompactionStrategy::SizeTiered => self.compact_level_wholesale(level)?,
                CompactionStrategy::Leveled => self.compact_level_overlapping(level)?,
            }
        }
        Ok(())
    }

    /// Trigger check: at least two tables, and over the per-level
    /// threshold (base × level).
    fn level_is_due(&self, level: usize) -> Result<bool> {
        let tables: Vec<&Table> = self.levels.tables_at(level).collect();
        if tables.len() < 2 {
            return Ok(false);
        }
        Ok(match self.cfg.compaction_trigger {
            CompactionTrigger::Bytes => {
                let total: u64 = tables
                    .iter()
                    .map(|t| t.data_len())
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .sum();
                total >= self.cfg.level_byte_limit * level as u64
            }
            CompactionTrigger::Count => tables.len() >= self.cfg.level_table_limit * level,
        })
    }

    /// Size-tiered: merge ALL of level L into one new table at L+1.
    fn compact_level_wholesale(&mut self, level: usize) -> Result<()> {
        let target = level + 1;
        let source_ids: Vec<TableId> = self.levels.tables_at(level).map(Table::id).collect();

        let merged = {
            let dict = self.dict_ref();
            // tables_at yields newest-first — the merge's tie order.
            let streams = self
                .levels
                .tables_at(level)
                .map(|t| t.stream(dict))
                .collect::<Result<Vec<_>>>()?;
            StreamMerger::new(streams).collect_all()?
        };

        let keep_tombstones = self.shadowable_data_remains(&source_ids, target);
        let output: Vec<Record> = merged
            .into_iter()
            .filter(|rec| keep_tombstones || !rec.tombstone)
            .collect();

        if !output.is_empty() {
            let id = self.levels.allocate(target)?;
            TableBuilder::build(
                self.levels.dir(),
                id,
                output.len(),
                output,
                &self.cfg,
                &mut self.dict,
            )?;
            if self.cfg.key_compression {
                self.dict.save(self.cfg.dictionary_path())?;
            }
            let table = Table::open(self.levels.dir(), id)?;
            self.levels.register(table);
        }

        self.delete_tables(&source_ids)?;
        info!(
            level,
            target,
            sources = source_ids.len(),
            "size-tiered compaction finished"
        );
        Ok(())
    }

    /// Leveled: merge each L table with its key-range overlaps at L+1,
    /// re-splitting the output by the byte limit.
    fn compact_level_overlapping(&mut self, level: usize) -> Result<()> {
        let target = level + 1;
        // Oldest first: older tables sink before newer ones so the newest
        // version still wins every merge it appears in.
        let mut source_ids: Vec<TableId> = self.levels.tables_at(level).map(Table::id).collect();
        source_ids.reverse();

        for source_id in source_ids {
            let Some(source) = self.levels.tables().iter().find(|t| t.id() == source_id)
            else {
                continue;
            };
            let (lo, hi) = source.key_range()?;

            let overlap_ids: Vec<TableId> = self
                .levels
                .tables_at(target)
                .filter(|t| {
                    t.key_range()
                        .map(|(first, last)| first <= hi && last >= lo)
                        .unwrap_or(false)
                })
                .map(Table::id)
                .collect();

            let merged = {
                let dict = self.dict_ref();
                // The L table is newer than everything at L+1; it leads
                // the stream order so it wins exact-timestamp ties.
                let mut streams = Vec::with_capacity(1 + overlap_ids.len());
                for id in std::iter::once(source_id).chain(overlap_ids.iter().copied()) {
                    let table = self
                        .levels
                        .tables()
                        .iter()
                        .find(|t| t.id() == id)
                        .expect("id taken from the registry");
                    streams.push(table.stream(dict)?);
                }
                StreamMerger::new(streams).collect_all()?
            };

            let mut sources = overlap_ids.clone();
            sources.push(source_id);
            let keep_tombstones = self.shadowable_data_remains(&sources, target);
            let output: Vec<Record> = merged
                .into_iter()
                .filter(|rec| keep_tombstones || !rec.tombstone)
                .collect();

            // Re-split by the byte limit so the target level keeps tables
            // of bounded size.
            for chunk in split_by_bytes(output, self.cfg.level_byte_limit, self.cfg.key_compression)
            {
                let id = self.levels.allocate(target)?;
                TableBuilder::build(
                    self.levels.dir(),
                    id,
                    chunk.len(),
                    chunk,
                    &self.cfg,
                    &mut self.dict,
                )?;
                let table = Table::open(self.levels.dir(), id)?;
                self.levels.register(table);
            }
            if self.cfg.key_compression {
                self.dict.save(self.cfg.dictionary_path())?;
            }

            let mut doomed = overlap_ids;
            doomed.push(source_id);
            self.delete_tables(&doomed)?;
        }

        info!(level, target, "leveled compaction finished");
        Ok(())
    }

    /// Whether any table **outside the merge's sources** still lives at or
    /// below the target level. While one does, a winning tombstone must
    /// survive the merge — dropping it would resurrect the older version
    /// that table may hold.
    fn shadowable_data_remains(&self, source_ids: &[TableId], target: usize) -> bool {
        self.levels
            .tables()
            .iter()
            .any(|t| t.id().level >= target && !source_ids.contains(&t.id()))
    }

    /// Removes tables from the registry and deletes their five files.
    fn delete_tables(&mut self, ids: &[TableId]) -> Result<()> {
        for id in ids {
            if let Some(table) = self.levels.take(*id) {
                table.delete()?;
            }
        }
        Ok(())
    }
}

/// Greedy split of a sorted record run into chunks of at most
/// `byte_limit` serialized bytes (always at least one record per chunk).
fn split_by_bytes(records: Vec<Record>, byte_limit: u64, compressed: bool) -> Vec<Vec<Record>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = 0u64;

    for rec in records {
        let len = rec.encoded_len(compressed);
        if !current.is_empty() && current_bytes + len > byte_limit {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += len;
        current.push(rec);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
