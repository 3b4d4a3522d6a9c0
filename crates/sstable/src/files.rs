//! Filename scheme shared by all five companion files.
//!
//! `lvl_<L>_sstable_<kind>_<N>.<ext>` — the `(level, sequence)` pair is the
//! table's identity; the sequence is allocated from a monotonic counter and
//! never reused, so "higher sequence" always means "newer table".

use std::io;
use std::path::{Path, PathBuf};

/// One of the five companion files of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFile {
    Data,
    Index,
    Summary,
    Filter,
    Metadata,
}

impl TableFile {
    fn kind(self) -> &'static str {
        match self {
            TableFile::Data => "data",
            TableFile::Index => "index",
            TableFile::Summary => "summary",
            TableFile::Filter => "filter",
            TableFile::Metadata => "metadata",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            TableFile::Data | TableFile::Index | TableFile::Summary => "db",
            TableFile::Filter | TableFile::Metadata => "bin",
        }
    }

    /// All five kinds, for whole-table deletion.
    pub const ALL: [TableFile; 5] = [
        TableFile::Data,
        TableFile::Index,
        TableFile::Summary,
        TableFile::Filter,
        TableFile::Metadata,
    ];
}

/// Identity of one table: its level and sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableId {
    pub level: usize,
    pub seq: u64,
}

impl TableId {
    /// Path of one companion file under `dir`.
    #[must_use]
    pub fn path(&self, dir: &Path, file: TableFile) -> PathBuf {
        dir.join(format!(
            "lvl_{}_sstable_{}_{}.{}",
            self.level,
            file.kind(),
            self.seq,
            file.extension()
        ))
    }
}

/// Parses a **data** filename back into a [`TableId`]; `None` for every
/// other file (companions are derived from the id, never scanned).
fn parse_data_filename(name: &str) -> Option<TableId> {
    let rest = name.strip_prefix("lvl_")?;
    let (level, rest) = rest.split_once("_sstable_data_")?;
    let seq = rest.strip_suffix(".db")?;
    Some(TableId {
        level: level.parse().ok()?,
        seq: seq.parse().ok()?,
    })
}

/// Lists every table in `dir` by scanning for data files, sorted by level
/// ascending and, within a level, sequence **descending** (newest first) —
/// the read path's visiting order.
pub fn list_tables(dir: &Path) -> io::Result<Vec<TableId>> {
    let mut ids = Vec::new();
    if !dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.path().file_name().and_then(|n| n.to_str()) {
            if let Some(id) = parse_data_filename(name) {
                ids.push(id);
            }
        }
    }
    ids.sort_by(|a, b| a.level.cmp(&b.level).then(b.seq.cmp(&a.seq)));
    Ok(ids)
}

// ---- Index / summary entry layouts (big-endian) ----
//
// Index:   [key_len: u64][key][data_offset: u64]
// Summary: [first_key_len: u64][first_key][last_key_len: u64][last_key][index_offset: u64]
//
// Both files always store raw keys, even when the data file is
// key-compressed — the narrowing stages must be able to compare against
// the caller's key without the dictionary.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Longest key the entry readers will allocate for; matches the record
/// layer's cap.
const MAX_ENTRY_KEY_BYTES: u64 = 64 * 1024;

pub(crate) fn write_index_entry<W: Write>(w: &mut W, key: &str, offset: u64) -> io::Result<()> {
    w.write_u64::<BigEndian>(key.len() as u64)?;
    w.write_all(key.as_bytes())?;
    w.write_u64::<BigEndian>(offset)?;
    Ok(())
}

/// Serialized size of one index entry, for summary offset arithmetic.
pub(crate) fn index_entry_len(key: &str) -> u64 {
    8 + key.len() as u64 + 8
}

/// Reads one index entry; `None` on clean EOF.
pub(crate) fn read_index_entry<R: Read>(r: &mut R) -> io::Result<Option<(String, u64)>> {
    let key = match read_length_prefixed_key(r)? {
        Some(k) => k,
        None => return Ok(None),
    };
    let offset = r.read_u64::<BigEndian>()?;
    Ok(Some((key, offset)))
}

pub(crate) fn write_summary_entry<W: Write>(
    w: &mut W,
    first_key: &str,
    last_key: &str,
    offset: u64,
) -> io::Result<()> {
    w.write_u64::<BigEndian>(first_key.len() as u64)?;
    w.write_all(first_key.as_bytes())?;
    w.write_u64::<BigEndian>(last_key.len() as u64)?;
    w.write_all(last_key.as_bytes())?;
    w.write_u64::<BigEndian>(offset)?;
    Ok(())
}

/// Reads one summary entry; `None` on clean EOF.
pub(crate) fn read_summary_entry<R: Read>(r: &mut R) -> io::Result<Option<(String, String, u64)>> {
    let first = match read_length_prefixed_key(r)? {
        Some(k) => k,
        None => return Ok(None),
    };
    let last = read_length_prefixed_key(r)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "truncated summary entry")
    })?;
    let offset = r.read_u64::<BigEndian>()?;
    Ok(Some((first, last, offset)))
}

fn read_length_prefixed_key<R: Read>(r: &mut R) -> io::Result<Option<String>> {
    let len = match r.read_u64::<BigEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_ENTRY_KEY_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "entry key length exceeds cap",
        ));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "entry key is not valid UTF-8"))
}
