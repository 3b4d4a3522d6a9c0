//! Table registry and the persisted sequence counter.
//!
//! Per-level table membership is derived from the directory itself (the
//! filenames carry level and sequence), so there is nothing to keep
//! consistent with the filesystem. The only state that must survive a
//! restart is the **next sequence number** — sequences are monotonic and
//! never reused, which is what makes "higher sequence" mean "newer table"
//! forever. The counter file is rewritten with tmp + rename.

use anyhow::{Context, Result};
use record::KeyDictionary;
use sstable::{list_tables, Table, TableId};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::error;

/// Open handles for every live table, sorted in read order (level
/// ascending, sequence descending), plus the counter.
pub(crate) struct Levels {
    dir: PathBuf,
    counter_path: PathBuf,
    next_seq: u64,
    tables: Vec<Table>,
}

impl Levels {
    /// Scans `dir`, opens every table and integrity-checks it against its
    /// hash tree. A table whose recomputed tree disagrees with the
    /// persisted one is rejected — logged and left out of the registry —
    /// without taking the rest of the store down.
    pub(crate) fn open(
        dir: PathBuf,
        counter_path: PathBuf,
        dict: Option<&KeyDictionary>,
    ) -> Result<Self> {
        fs::create_dir_all(&dir)?;

        let mut tables = Vec::new();
        let mut highest_seq = 0u64;
        for id in list_tables(&dir)? {
            highest_seq = highest_seq.max(id.seq);
            let table = Table::open(&dir, id)?;
            if let Err(e) = table.verify(dict) {
                error!(?id, error = %e, "altered sstable rejected at load");
                continue;
            }
            tables.push(table);
        }
        tables.sort_by_key(|t| (t.id().level, std::cmp::Reverse(t.id().seq)));

        let persisted = read_counter(&counter_path)?;
        // The counter can lag the directory after a crash between a table
        // publish and the counter save; the scan wins.
        let next_seq = persisted.max(highest_seq + 1);

        Ok(Self {
            dir,
            counter_path,
            next_seq,
            tables,
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn len(&self) -> usize {
        self.tables.len()
    }

    /// Every table in read order: level 1 before level 2, newest sequence
    /// first within a level.
    pub(crate) fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub(crate) fn tables_at(&self, level: usize) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(move |t| t.id().level == level)
    }

    /// Allocates the next table identity at `level` and persists the
    /// counter before the identity is used.
    pub(crate) fn allocate(&mut self, level: usize) -> Result<TableId> {
        let id = TableId {
            level,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.save_counter()?;
        Ok(id)
    }

    /// Registers a freshly built table, keeping read order.
    pub(crate) fn register(&mut self, table: Table) {
        self.tables.push(table);
        self.tables
            .sort_by_key(|t| (t.id().level, std::cmp::Reverse(t.id().seq)));
    }

    /// Takes a table out of the registry (for deletion by compaction).
    pub(crate) fn take(&mut self, id: TableId) -> Option<Table> {
        let pos = self.tables.iter().position(|t| t.id() == id)?;
        Some(self.tables.remove(pos))
    }

    fn save_counter(&self) -> Result<()> {
        let tmp = self.counter_path.with_extension("tmp");
        fs::write(&tmp, format!("{}\n", self.next_seq))
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.counter_path)?;
        Ok(())
    }
}

fn read_counter(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(1);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    raw.trim()
        .parse()
        .with_context(|| format!("malformed sequence counter in {}", path.display()))
}
