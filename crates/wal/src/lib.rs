//! # WAL — segmented write-ahead log
//!
//! Durable, append-only record of every mutation, written **before** the
//! corresponding memtable update. On restart the log is replayed to rebuild
//! the in-memory state, so no acknowledged write is lost.
//!
//! The log is split into fixed-size segment files, `wal_00001.log`,
//! `wal_00002.log`, ... — capped by **bytes**, not records, so a single
//! logical record may straddle two (or more) physical segments. The reader
//! side reassembles straddled records through [`SegmentChain`], one
//! resumable `Read` over the whole segment sequence, instead of handling
//! the boundary per field.
//!
//! After a memtable flush the engine calls [`Wal::truncate`] with the exact
//! number of bytes the flushed records occupied: whole reclaimed segments
//! are deleted, a partially reclaimed segment is rewritten with only its
//! surviving tail, and the remaining files are renumbered from 1 — the log
//! shrinks byte-precisely rather than being deleted wholesale.
//!
//! ## Failure semantics
//!
//! I/O errors propagate to the caller. A record that fails its CRC during
//! replay is skipped with a WARN diagnostic and replay continues —
//! at-least-once durability is preferred over all-or-nothing.

mod segment;

pub use segment::SegmentChain;

use record::{Record, RecordError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors raised by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying file I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record-level failure that is not recoverable by skipping
    /// (encoding bugs, dictionary exhaustion — never CRC mismatches).
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// The segmented write-ahead log.
///
/// Handles are opened per operation and released on every exit path; the
/// only state held between calls is the directory, the byte budget and the
/// live segment count.
pub struct Wal {
    dir: PathBuf,
    segment_size: u64,
    /// Number of live segments; they are always numbered `1..=segment_count`.
    segment_count: u64,
}

impl Wal {
    /// Opens the log in `dir`, creating the directory and an initial empty
    /// segment when none exists. Existing segments are discovered by scan.
    pub fn open<P: AsRef<Path>>(dir: P, segment_size: u64) -> Result<Self, WalError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut highest = 0u64;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(n) = parse_segment_number(&entry.path()) {
                highest = highest.max(n);
            }
        }

        if highest == 0 {
            File::create(segment_path(&dir, 1))?;
            highest = 1;
        }

        Ok(Self {
            dir,
            segment_size,
            segment_count: highest,
        })
    }

    /// Number of live segment files.
    #[must_use]
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    /// Total logical size of the log in bytes, summed over all segments.
    pub fn total_bytes(&self) -> Result<u64, WalError> {
        let mut total = 0;
        for n in 1..=self.segment_count {
            total += fs::metadata(segment_path(&self.dir, n))?.len();
        }
        Ok(total)
    }

    /// Serializes a new record for `key`, writes it to the log — rotating
    /// to a new segment when the current one lacks room, splitting the
    /// record's bytes across the boundary if necessary — and returns the
    /// constructed [`Record`] so the caller can mirror it into the memtable
    /// and cache without re-reading the log.
    pub fn append(
        &mut self,
        key: &str,
        value: &[u8],
        tombstone: bool,
    ) -> Result<Record, WalError> {
        let rec = if tombstone {
            Record::tombstone(key)
        } else {
            Record::new(key, value)
        };
        self.append_record(&rec)?;
        Ok(rec)
    }

    /// Appends an already-constructed record (for callers that must control
    /// the timestamp, and for tests).
    pub fn append_record(&mut self, rec: &Record) -> Result<(), WalError> {
        let mut bytes = Vec::with_capacity(rec.encoded_len(false) as usize);
        rec.write_to(&mut bytes)?;

        let mut remaining: &[u8] = &bytes;
        while !remaining.is_empty() {
            let path = segment_path(&self.dir, self.segment_count);
            let used = fs::metadata(&path)?.len();
            let room = self.segment_size.saturating_sub(used);

            if room == 0 {
                self.segment_count += 1;
                File::create(segment_path(&self.dir, self.segment_count))?;
                continue;
            }

            let take = remaining.len().min(room as usize);
            let mut f = OpenOptions::new().append(true).open(&path)?;
            f.write_all(&remaining[..take])?;
            f.sync_all()?;
            remaining = &remaining[take..];
        }

        Ok(())
    }

    /// Reconstructs every record across all segments in original write
    /// order. Records failing their checksum are dropped with a WARN;
    /// a record with garbage length fields ends the replay early (the
    /// stream cannot be realigned past it), keeping everything read so far.
    pub fn load_all(&self) -> Result<Vec<Record>, WalError> {
        let paths: Vec<PathBuf> = (1..=self.segment_count)
            .map(|n| segment_path(&self.dir, n))
            .collect();
        let mut chain = SegmentChain::open(paths)?;

        let mut records = Vec::new();
        loop {
            match Record::read_from(&mut chain) {
                Ok(Some(rec)) => records.push(rec),
                Ok(None) => break,
                Err(RecordError::Corrupt { .. }) => {
                    warn!("dropping wal record with bad checksum (torn write)");
                    continue;
                }
                Err(RecordError::Malformed(reason)) => {
                    warn!(reason, "wal stream unreadable past this point; stopping replay");
                    break;
                }
                Err(RecordError::Io(e)) => return Err(e.into()),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(records)
    }

    /// Removes `bytes_to_reclaim` bytes from the oldest end of the log.
    ///
    /// Whole covered segments are deleted; a partially covered segment is
    /// rewritten with only its surviving tail; survivors are renumbered
    /// from 1. Reclaiming exactly to the end of the last segment collapses
    /// the log to a single fresh empty segment.
    pub fn truncate(&mut self, bytes_to_reclaim: u64) -> Result<(), WalError> {
        let sizes: Vec<u64> = (1..=self.segment_count)
            .map(|n| fs::metadata(segment_path(&self.dir, n)).map(|m| m.len()))
            .collect::<Result<_, _>>()?;
        let total: u64 = sizes.iter().sum();
        let reclaim = bytes_to_reclaim.min(total);

        // How many whole segments the reclaim covers, and how far into the
        // next one it reaches.
        let mut whole = 0usize;
        let mut leftover = reclaim;
        while whole < sizes.len() && leftover >= sizes[whole] {
            leftover -= sizes[whole];
            whole += 1;
        }

        if whole == sizes.len() {
            // Reclaim reached exactly the end of the last segment: collapse
            // the whole log to one fresh segment.
            for n in 1..=self.segment_count {
                fs::remove_file(segment_path(&self.dir, n))?;
            }
            File::create(segment_path(&self.dir, 1))?;
            self.segment_count = 1;
            return Ok(());
        }

        for n in 1..=whole as u64 {
            fs::remove_file(segment_path(&self.dir, n))?;
        }

        if leftover > 0 {
            // Shift the surviving tail of the partially reclaimed segment
            // down to its start, via tmp + rename.
            let path = segment_path(&self.dir, whole as u64 + 1);
            let data = fs::read(&path)?;
            let tmp = path.with_extension("tmp");
            {
                let mut f = File::create(&tmp)?;
                f.write_all(&data[leftover as usize..])?;
                f.sync_all()?;
            }
            fs::rename(&tmp, &path)?;
        }

        // Renumber survivors down so segments stay 1..=count. Ascending
        // order: every target number is below its source.
        if whole > 0 {
            for (offset, old_n) in (whole as u64 + 1..=self.segment_count).enumerate() {
                fs::rename(
                    segment_path(&self.dir, old_n),
                    segment_path(&self.dir, offset as u64 + 1),
                )?;
            }
            self.segment_count -= whole as u64;
        }

        Ok(())
    }
}

/// `wal_00042.log` for segment 42.
fn segment_path(dir: &Path, n: u64) -> PathBuf {
    dir.join(format!("wal_{:05}.log", n))
}

/// Parses a segment number back out of a path; `None` for foreign files.
fn parse_segment_number(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix("wal_")?.strip_suffix(".log")?;
    digits.parse().ok()
}
