//! Process-wide key ↔ index dictionary backing key compression.
//!
//! When key compression is enabled, SSTable data files store a fixed-width
//! 2-byte index in place of the raw key bytes. The mapping is shared by the
//! whole process: loaded once at engine start, extended whenever a table
//! build meets a new key, and persisted back to disk before shutdown (and
//! after every build, so a crash never strands compressed tables without
//! their dictionary).
//!
//! Single-writer discipline: the dictionary is owned by the engine and
//! passed by `&mut` — no interior locking.
//!
//! ## File format (big-endian)
//!
//! ```text
//! [entry_count: u32] then per entry: [key_len: u64][key bytes]
//! ```
//!
//! Indices are implied by entry order, so the file stays append-shaped and
//! the mapping survives round trips byte-identically.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::{RecordError, MAX_KEY_BYTES};

/// Bidirectional key ↔ u16 mapping with load/persist lifecycle.
#[derive(Debug, Default)]
pub struct KeyDictionary {
    by_key: HashMap<String, u16>,
    by_index: Vec<String>,
}

impl KeyDictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interned keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Returns `true` if no key has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Returns the index for `key`, interning it if unseen.
    ///
    /// # Errors
    ///
    /// [`RecordError::DictionaryFull`] once all `u16` slots are taken.
    pub fn intern(&mut self, key: &str) -> Result<u16, RecordError> {
        if let Some(&idx) = self.by_key.get(key) {
            return Ok(idx);
        }
        if self.by_index.len() > u16::MAX as usize {
            return Err(RecordError::DictionaryFull(self.by_index.len()));
        }
        let idx = self.by_index.len() as u16;
        self.by_index.push(key.to_string());
        self.by_key.insert(key.to_string(), idx);
        Ok(idx)
    }

    /// Looks up the key stored at `idx`.
    #[must_use]
    pub fn resolve(&self, idx: u16) -> Option<&str> {
        self.by_index.get(idx as usize).map(String::as_str)
    }

    /// Loads the dictionary from `path`. A missing file yields an empty
    /// dictionary (fresh database).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RecordError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let mut r = BufReader::new(File::open(path)?);

        let count = r.read_u32::<BigEndian>()?;
        let mut dict = Self::new();
        for _ in 0..count {
            let len = r.read_u64::<BigEndian>()?;
            if len > MAX_KEY_BYTES {
                return Err(RecordError::Malformed("dictionary key exceeds cap"));
            }
            let mut buf = vec![0u8; len as usize];
            r.read_exact(&mut buf)?;
            let key = String::from_utf8(buf)
                .map_err(|_| RecordError::Malformed("dictionary key is not valid UTF-8"))?;
            dict.intern(&key)?;
        }

        // Trailing bytes mean the file was not written by us.
        let mut probe = [0u8; 1];
        match r.read(&mut probe) {
            Ok(0) => Ok(dict),
            Ok(_) => Err(RecordError::Malformed("trailing bytes in dictionary file")),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(dict),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists the dictionary to `path`, overwriting.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RecordError> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_u32::<BigEndian>(self.by_index.len() as u32)?;
        for key in &self.by_index {
            w.write_u64::<BigEndian>(key.len() as u64)?;
            w.write_all(key.as_bytes())?;
        }
        w.flush()?;
        w.into_inner()
            .map_err(|e| RecordError::Io(io::Error::other(e)))?
            .sync_all()?;
        Ok(())
    }
}
