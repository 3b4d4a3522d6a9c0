//! Prefix and range scans with resumable cursors.
//!
//! Both scans reuse the point lookup's three-stage narrowing
//! (summary → index → data), only with interval comparisons instead of
//! equality. Every match is returned together with the data-file byte
//! offset *after* it — a cursor the engine hands back to
//! [`Table::next_prefix`] / [`Table::next_range`] to resume the scan
//! without rewinding, which is what lets it interleave pages across many
//! tables and memtables.
//!
//! Tombstones are returned like live records: the engine needs them to
//! shadow older versions in other sources before it filters them from the
//! final page.

use anyhow::{Context, Result};
use record::{KeyDictionary, Record, RecordError};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use tracing::warn;

use crate::files::{read_index_entry, TableFile};
use crate::reader::{read_record, Table};

impl Table {
    /// First record whose key starts with `prefix`, with its resume
    /// cursor. `Ok(None)` when the table holds no such key.
    pub fn find_first_prefix(
        &self,
        prefix: &str,
        dict: Option<&KeyDictionary>,
    ) -> Result<Option<(Record, u64)>> {
        let Some(start) = self.scan_start(prefix)? else {
            return Ok(None);
        };
        let mut cursor = DataCursor::open(self, start)?;
        while let Some((rec, pos)) = cursor.next_record(dict)? {
            if rec.key.starts_with(prefix) {
                return Ok(Some((rec, pos)));
            }
            if rec.key.as_str() > prefix {
                // Past every possible prefixed key.
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// Next prefixed record at or after `cursor`. `Ok(None)` once the
    /// prefix interval is exhausted.
    pub fn next_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        dict: Option<&KeyDictionary>,
    ) -> Result<Option<(Record, u64)>> {
        let mut data = DataCursor::open(self, cursor)?;
        match data.next_record(dict)? {
            Some((rec, pos)) if rec.key.starts_with(prefix) => Ok(Some((rec, pos))),
            _ => Ok(None),
        }
    }

    /// First record with `start <= key <= end`, with its resume cursor.
    pub fn find_first_range(
        &self,
        start: &str,
        end: &str,
        dict: Option<&KeyDictionary>,
    ) -> Result<Option<(Record, u64)>> {
        let Some(offset) = self.scan_start(start)? else {
            return Ok(None);
        };
        let mut cursor = DataCursor::open(self, offset)?;
        while let Some((rec, pos)) = cursor.next_record(dict)? {
            if rec.key.as_str() < start {
                continue;
            }
            return if rec.key.as_str() <= end {
                Ok(Some((rec, pos)))
            } else {
                Ok(None)
            };
        }
        Ok(None)
    }

    /// Next in-range record at or after `cursor`.
    pub fn next_range(
        &self,
        end: &str,
        cursor: u64,
        dict: Option<&KeyDictionary>,
    ) -> Result<Option<(Record, u64)>> {
        let mut data = DataCursor::open(self, cursor)?;
        match data.next_record(dict)? {
            Some((rec, pos)) if rec.key.as_str() <= end => Ok(Some((rec, pos))),
            _ => Ok(None),
        }
    }

    /// Narrows to the data offset where a scan for keys ≥ `lower_bound`
    /// should begin: the index floor of the bound within its governing
    /// summary chunk, or the first entry when the whole table sits above
    /// the bound.
    fn scan_start(&self, lower_bound: &str) -> Result<Option<u64>> {
        // Summary stage: predecessor on first_key, falling back to the
        // very first chunk when the bound precedes the whole table.
        let mut summary = self.open_companion(TableFile::Summary)?;
        let mut governing: Option<(u64, String)> = None;
        let mut first_chunk: Option<(u64, String)> = None;
        while let Some((first, last, offset)) = crate::files::read_summary_entry(&mut summary)? {
            if first_chunk.is_none() {
                first_chunk = Some((offset, last.clone()));
            }
            if first.as_str() > lower_bound {
                break;
            }
            governing = Some((offset, last));
        }
        let Some((index_offset, bound)) = governing.or(first_chunk) else {
            return Ok(None);
        };

        // Index stage: floor entry, falling back to the chunk's first
        // entry when even it is above the bound.
        let mut index = self.open_companion(TableFile::Index)?;
        index.seek(SeekFrom::Start(index_offset))?;

        let mut start: Option<u64> = None;
        let mut first_entry: Option<u64> = None;
        while let Some((entry_key, data_offset)) = read_index_entry(&mut index)? {
            if first_entry.is_none() {
                first_entry = Some(data_offset);
            }
            if entry_key.as_str() <= lower_bound {
                start = Some(data_offset);
            } else {
                break;
            }
            if entry_key.as_str() >= bound.as_str() {
                break;
            }
        }
        Ok(start.or(first_entry))
    }
}

/// Sequential data-file reader that tracks its byte position, skipping
/// corrupt records while keeping the cursor exact.
struct DataCursor {
    reader: BufReader<File>,
    pos: u64,
}

impl DataCursor {
    fn open(table: &Table, pos: u64) -> Result<Self> {
        let mut reader = table.open_companion(TableFile::Data)?;
        reader.seek(SeekFrom::Start(pos))?;
        Ok(Self { reader, pos })
    }

    /// Next decodable record and the position just past it.
    fn next_record(
        &mut self,
        dict: Option<&KeyDictionary>,
    ) -> Result<Option<(Record, u64)>> {
        loop {
            match read_record(&mut self.reader, dict) {
                Ok(Some((rec, frame_len))) => {
                    self.pos += frame_len;
                    return Ok(Some((rec, self.pos)));
                }
                Ok(None) => return Ok(None),
                Err(RecordError::Corrupt { frame_len }) => {
                    self.pos += frame_len;
                    warn!("skipping corrupt record during scan");
                    continue;
                }
                Err(e) => return Err(e).context("reading data file during scan"),
            }
        }
    }
}
