//! Point lookups and whole-table loading.
//!
//! A [`Table`] handle keeps only the table's identity and its bloom filter
//! in memory; every lookup opens the companion files it needs and releases
//! them on return (scoped acquisition, per the engine's resource model).
//!
//! The lookup narrows in three stages:
//!
//! 1. **Filter** — a negative probe skips the table with zero file reads.
//! 2. **Summary** — sequential scan for the one entry whose
//!    `[first_key, last_key]` range could contain the target; its offset
//!    bounds the index scan and its `last_key` bounds how far to look.
//! 3. **Index** — predecessor scan from that offset: the last entry with a
//!    key ≤ the target names the data-file offset to start from (the index
//!    is sparse, so this is a floor search, not an exact match).
//! 4. **Data** — linear scan verifying each record's CRC until the exact
//!    key (returned, tombstone or not) or a greater key (not present).
//!    Corrupt records are skipped as holes, with a WARN.

use anyhow::{bail, Context, Result};
use bloom::BloomFilter;
use merkle::{MerkleBuilder, MerkleTree};
use record::{KeyDictionary, Record, RecordError};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::files::{read_index_entry, read_summary_entry, TableFile, TableId};

/// Read handle for one immutable table.
pub struct Table {
    dir: PathBuf,
    id: TableId,
    filter: BloomFilter,
}

impl Table {
    /// Opens the table, loading its bloom filter. The other companions are
    /// opened per lookup.
    pub fn open(dir: &Path, id: TableId) -> Result<Self> {
        let filter_path = id.path(dir, TableFile::Filter);
        let mut f = BufReader::new(
            File::open(&filter_path)
                .with_context(|| format!("opening {}", filter_path.display()))?,
        );
        let filter = BloomFilter::read_from(&mut f)
            .with_context(|| format!("reading {}", filter_path.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            id,
            filter,
        })
    }

    /// The table's `(level, sequence)` identity.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Byte size of the data file (the quantity compaction triggers meter).
    pub fn data_len(&self) -> Result<u64> {
        Ok(fs::metadata(self.id.path(&self.dir, TableFile::Data))?.len())
    }

    /// Filter probe: `false` means the key is definitely absent.
    #[must_use]
    pub fn may_contain(&self, key: &str) -> bool {
        self.filter.may_contain(key.as_bytes())
    }

    /// The `[first_key, last_key]` span of the whole table, read from the
    /// summary. Used by leveled compaction to find overlapping tables.
    pub fn key_range(&self) -> Result<(String, String)> {
        let mut summary = self.open_companion(TableFile::Summary)?;
        let mut range: Option<(String, String)> = None;
        while let Some((first, last, _)) = read_summary_entry(&mut summary)? {
            range = Some(match range {
                None => (first, last),
                Some((lo, _)) => (lo, last),
            });
        }
        range.ok_or_else(|| anyhow::anyhow!("summary of {:?} is empty", self.id))
    }

    /// Point lookup. Returns the record — tombstone or not — when the key
    /// is present; interpreting tombstones is the engine's job.
    ///
    /// `dict` must be `Some` for tables written with key compression.
    pub fn search(&self, key: &str, dict: Option<&KeyDictionary>) -> Result<Option<Record>> {
        if !self.may_contain(key) {
            return Ok(None);
        }

        let Some((index_offset, bound)) = self.summary_lookup(key)? else {
            return Ok(None);
        };
        let Some(data_offset) = self.index_floor(key, index_offset, &bound)? else {
            return Ok(None);
        };

        let mut data = self.open_companion(TableFile::Data)?;
        data.seek(SeekFrom::Start(data_offset))?;

        loop {
            match read_record(&mut data, dict) {
                Ok(Some((rec, _))) => {
                    if rec.key == key {
                        return Ok(Some(rec));
                    }
                    if rec.key.as_str() > key {
                        return Ok(None);
                    }
                }
                Ok(None) => return Ok(None),
                Err(RecordError::Corrupt { .. }) => {
                    warn!(table = ?self.id, "skipping corrupt record during lookup");
                    continue;
                }
                Err(e) => return Err(e).context("reading data file"),
            }
        }
    }

    /// Stage 2: the summary entry governing `key`, as
    /// `(index_offset, last_key_bound)`.
    ///
    /// Predecessor semantics, like the index stage below: the last entry
    /// whose `first_key` ≤ the target. The entry's `last_key` names its
    /// final *index* key, but the data region it governs runs up to the
    /// next entry's first key — a target between two entries (or after
    /// the last indexed key entirely) still belongs to the earlier one.
    pub(crate) fn summary_lookup(&self, key: &str) -> Result<Option<(u64, String)>> {
        let mut summary = self.open_companion(TableFile::Summary)?;
        let mut governing: Option<(u64, String)> = None;
        while let Some((first, last, offset)) = read_summary_entry(&mut summary)? {
            if first.as_str() > key {
                break;
            }
            governing = Some((offset, last));
        }
        Ok(governing)
    }

    /// Stage 3: from `index_offset`, the last index entry with key ≤ the
    /// target; the scan stops past the target or after the chunk's
    /// `bound` key.
    pub(crate) fn index_floor(
        &self,
        key: &str,
        index_offset: u64,
        bound: &str,
    ) -> Result<Option<u64>> {
        let mut index = self.open_companion(TableFile::Index)?;
        index.seek(SeekFrom::Start(index_offset))?;

        let mut floor: Option<u64> = None;
        while let Some((entry_key, data_offset)) = read_index_entry(&mut index)? {
            if entry_key.as_str() <= key {
                floor = Some(data_offset);
            } else {
                break;
            }
            if entry_key.as_str() >= bound {
                break;
            }
        }
        Ok(floor)
    }

    /// Recomputes the hash tree over the data file and compares it with the
    /// persisted one. Any difference — including a single undecodable
    /// record — rejects the table as altered.
    pub fn verify(&self, dict: Option<&KeyDictionary>) -> Result<()> {
        let data_path = self.id.path(&self.dir, TableFile::Data);
        let data = fs::read(&data_path)
            .with_context(|| format!("reading {}", data_path.display()))?;

        let mut tree = MerkleBuilder::new();
        let mut cursor = std::io::Cursor::new(&data);
        let mut pos = 0usize;
        loop {
            match read_record(&mut cursor, dict) {
                Ok(Some((_, frame_len))) => {
                    tree.add(&data[pos..pos + frame_len as usize]);
                    pos += frame_len as usize;
                }
                Ok(None) => break,
                Err(_) => bail!("table {:?} rejected: undecodable record", self.id),
            }
        }

        let meta_path = self.id.path(&self.dir, TableFile::Metadata);
        let mut meta = BufReader::new(
            File::open(&meta_path).with_context(|| format!("opening {}", meta_path.display()))?,
        );
        let persisted = MerkleTree::read_from(&mut meta)
            .with_context(|| format!("reading {}", meta_path.display()))?;

        if tree.build() != persisted {
            bail!("table {:?} rejected: data file was altered", self.id);
        }
        Ok(())
    }

    /// Deletes all five companion files. The handle is consumed — the
    /// table no longer exists.
    pub fn delete(self) -> Result<()> {
        for file in TableFile::ALL {
            let path = self.id.path(&self.dir, file);
            fs::remove_file(&path)
                .with_context(|| format!("deleting {}", path.display()))?;
        }
        Ok(())
    }

    /// Opens a pull stream over the data file, for compaction merges.
    pub fn stream<'a>(&self, dict: Option<&'a KeyDictionary>) -> Result<RecordStream<'a>> {
        RecordStream::open(self.id.path(&self.dir, TableFile::Data), self.id, dict)
    }

    pub(crate) fn open_companion(&self, file: TableFile) -> Result<BufReader<File>> {
        let path = self.id.path(&self.dir, file);
        Ok(BufReader::new(File::open(&path).with_context(|| {
            format!("opening {}", path.display())
        })?))
    }
}

/// Decodes one record in the mode implied by `dict`.
pub(crate) fn read_record<R: Read>(
    r: &mut R,
    dict: Option<&KeyDictionary>,
) -> Result<Option<(Record, u64)>, RecordError> {
    match dict {
        Some(dict) => Record::read_compressed_frame_from(r, dict),
        None => Record::read_frame_from(r),
    }
}

/// A pull-based stream of one table's records, front record buffered —
/// the primitive the multi-way compaction merge consumes.
pub struct RecordStream<'a> {
    reader: BufReader<File>,
    dict: Option<&'a KeyDictionary>,
    id: TableId,
    front: Option<Record>,
}

impl<'a> RecordStream<'a> {
    fn open(path: PathBuf, id: TableId, dict: Option<&'a KeyDictionary>) -> Result<Self> {
        let reader = BufReader::new(
            File::open(&path).with_context(|| format!("opening {}", path.display()))?,
        );
        let mut stream = Self {
            reader,
            dict,
            id,
            front: None,
        };
        stream.advance()?;
        Ok(stream)
    }

    /// The table this stream drains.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// The record at the front, `None` once the stream is exhausted.
    #[must_use]
    pub fn front(&self) -> Option<&Record> {
        self.front.as_ref()
    }

    /// Takes the front record and pulls the next one.
    pub fn pop(&mut self) -> Result<Option<Record>> {
        let front = self.front.take();
        if front.is_some() {
            self.advance()?;
        }
        Ok(front)
    }

    /// Reads the next record into `front`, skipping corrupt ones.
    pub fn advance(&mut self) -> Result<()> {
        loop {
            match read_record(&mut self.reader, self.dict) {
                Ok(Some((rec, _))) => {
                    self.front = Some(rec);
                    return Ok(());
                }
                Ok(None) => {
                    self.front = None;
                    return Ok(());
                }
                Err(RecordError::Corrupt { .. }) => {
                    warn!(table = ?self.id, "skipping corrupt record during merge");
                    continue;
                }
                Err(e) => return Err(e).context("reading data stream"),
            }
        }
    }
}
