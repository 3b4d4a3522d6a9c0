//! # Record — the SiltKV wire format
//!
//! A [`Record`] is the atomic unit of storage: one key-value pair (or a
//! tombstone marking the key deleted) with a timestamp for conflict
//! resolution and a CRC32 guarding the rest of the serialized bytes. The
//! same layout is used everywhere a record touches disk: WAL segments and
//! SSTable data files.
//!
//! ## Binary layout (big-endian)
//!
//! ```text
//! [crc32: u32][timestamp: i64][tombstone: u8][key_size: u64][value_size: u64][key][value]
//! ```
//!
//! - `value_size` and `value` are omitted entirely when `tombstone` is set.
//! - With key compression active (SSTable data files only), `key_size` is
//!   replaced by a 2-byte dictionary index and the raw key bytes are
//!   omitted:
//!
//! ```text
//! [crc32: u32][timestamp: i64][tombstone: u8][key_index: u16][value_size: u64][value]
//! ```
//!
//! The CRC always covers the serialized form of everything after the CRC
//! field itself — so the compressed and raw encodings of the same record
//! carry different checksums, and a record can only be verified in the mode
//! it was written in.

mod dictionary;

pub use dictionary::KeyDictionary;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Upper bound on a key we will allocate while decoding (64 KiB).
/// A larger length field means the stream is garbage, not a big key.
pub const MAX_KEY_BYTES: u64 = 64 * 1024;

/// Upper bound on a value we will allocate while decoding (16 MiB).
pub const MAX_VALUE_BYTES: u64 = 16 * 1024 * 1024;

/// Errors raised while encoding or decoding records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O failure. Propagated, never retried.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The stored CRC32 disagrees with the recomputed one. The reader is
    /// still positioned at the next record boundary and `frame_len` reports
    /// how many bytes the bad record occupied, so the caller may skip it
    /// and keep an accurate byte cursor.
    #[error("record failed checksum verification")]
    Corrupt {
        /// Serialized length of the corrupt record, CRC field included.
        frame_len: u64,
    },

    /// A length field is outside any sane bound; the stream cannot be
    /// realigned past this point.
    #[error("malformed record: {0}")]
    Malformed(&'static str),

    /// The key dictionary has no free slot left (u16 space exhausted).
    #[error("key dictionary full ({0} entries)")]
    DictionaryFull(usize),

    /// A compressed record references a dictionary index we do not know.
    #[error("unknown key-dictionary index {0}")]
    UnknownKeyIndex(u16),
}

/// One key-value pair or tombstone.
///
/// Ordering and equality follow the key; the timestamp decides conflicts
/// between two versions of the same key (newest wins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Nanoseconds since the UNIX epoch at creation/mutation time.
    pub timestamp: i64,
    /// Logical-delete marker. Tombstones carry no value bytes.
    pub tombstone: bool,
    /// UTF-8 sort key.
    pub key: String,
    /// Payload; always empty when `tombstone` is set.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a live record stamped with the current time.
    pub fn new(key: &str, value: &[u8]) -> Self {
        Self {
            timestamp: now_nanos(),
            tombstone: false,
            key: key.to_string(),
            value: value.to_vec(),
        }
    }

    /// Creates a tombstone stamped with the current time.
    pub fn tombstone(key: &str) -> Self {
        Self {
            timestamp: now_nanos(),
            tombstone: true,
            key: key.to_string(),
            value: Vec::new(),
        }
    }

    /// Serialized length in bytes for the given encoding mode.
    #[must_use]
    pub fn encoded_len(&self, compressed: bool) -> u64 {
        // crc + timestamp + tombstone flag
        let mut len: u64 = 4 + 8 + 1;
        if compressed {
            len += 2;
        } else {
            len += 8 + self.key.len() as u64;
        }
        if !self.tombstone {
            len += 8 + self.value.len() as u64;
        }
        len
    }

    /// Serializes this record to `w`, raw-key mode.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), RecordError> {
        let body = self.encode_body(None)?;
        let crc = crc32fast::hash(&body);
        w.write_u32::<BigEndian>(crc)?;
        w.write_all(&body)?;
        Ok(())
    }

    /// Serializes this record to `w`, substituting the key with its
    /// dictionary index (interning it on first use).
    pub fn write_compressed<W: Write>(
        &self,
        w: &mut W,
        dict: &mut KeyDictionary,
    ) -> Result<(), RecordError> {
        let idx = dict.intern(&self.key)?;
        let body = self.encode_body(Some(idx))?;
        let crc = crc32fast::hash(&body);
        w.write_u32::<BigEndian>(crc)?;
        w.write_all(&body)?;
        Ok(())
    }

    /// Builds the checksummed body: everything after the CRC field, in
    /// on-disk field order (sizes first, then key bytes, then value bytes).
    fn encode_body(&self, key_index: Option<u16>) -> Result<Vec<u8>, RecordError> {
        let mut body = Vec::with_capacity(32 + self.key.len() + self.value.len());
        body.write_i64::<BigEndian>(self.timestamp)?;
        body.write_u8(self.tombstone as u8)?;
        match key_index {
            Some(idx) => body.write_u16::<BigEndian>(idx)?,
            None => body.write_u64::<BigEndian>(self.key.len() as u64)?,
        }
        if !self.tombstone {
            body.write_u64::<BigEndian>(self.value.len() as u64)?;
        }
        if key_index.is_none() {
            body.extend_from_slice(self.key.as_bytes());
        }
        if !self.tombstone {
            body.extend_from_slice(&self.value);
        }
        Ok(body)
    }

    /// Reads one raw-key record from `r`.
    ///
    /// Returns `Ok(None)` on clean EOF **or** a torn tail (the stream ends
    /// mid-record) — complete records before a torn tail are still returned
    /// by earlier calls, matching at-least-once replay semantics.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Record>, RecordError> {
        Ok(Self::read_inner(r, None)?.map(|(rec, _)| rec))
    }

    /// Reads one dictionary-compressed record from `r`, resolving the key
    /// through `dict`.
    pub fn read_compressed<R: Read>(
        r: &mut R,
        dict: &KeyDictionary,
    ) -> Result<Option<Record>, RecordError> {
        Ok(Self::read_inner(r, Some(dict))?.map(|(rec, _)| rec))
    }

    /// Like [`read_from`](Record::read_from) but also reports the record's
    /// serialized length, for callers that maintain byte cursors into a
    /// data file.
    pub fn read_frame_from<R: Read>(r: &mut R) -> Result<Option<(Record, u64)>, RecordError> {
        Self::read_inner(r, None)
    }

    /// Frame-length variant of [`read_compressed`](Record::read_compressed).
    pub fn read_compressed_frame_from<R: Read>(
        r: &mut R,
        dict: &KeyDictionary,
    ) -> Result<Option<(Record, u64)>, RecordError> {
        Self::read_inner(r, Some(dict))
    }

    fn read_inner<R: Read>(
        r: &mut R,
        dict: Option<&KeyDictionary>,
    ) -> Result<Option<(Record, u64)>, RecordError> {
        let stored_crc = match r.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Re-serialize the body as we parse it so the CRC check covers the
        // exact bytes that were on disk.
        let mut body = Vec::with_capacity(64);

        let timestamp = match r.read_i64::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        body.write_i64::<BigEndian>(timestamp)?;

        let tombstone = match read_u8_eof(r)? {
            Some(0) => false,
            Some(1) => true,
            Some(_) => return Err(RecordError::Malformed("tombstone flag not 0/1")),
            None => return Ok(None),
        };
        body.write_u8(tombstone as u8)?;

        // Sizes come before any variable-length bytes, matching the layout.
        let (key_index, key_size) = match dict {
            Some(_) => {
                let idx = match r.read_u16::<BigEndian>() {
                    Ok(v) => v,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                body.write_u16::<BigEndian>(idx)?;
                (Some(idx), 0)
            }
            None => {
                let key_size = match r.read_u64::<BigEndian>() {
                    Ok(v) => v,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                if key_size > MAX_KEY_BYTES {
                    return Err(RecordError::Malformed("key size exceeds cap"));
                }
                body.write_u64::<BigEndian>(key_size)?;
                (None, key_size)
            }
        };

        let value_size = if tombstone {
            0
        } else {
            let value_size = match r.read_u64::<BigEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if value_size > MAX_VALUE_BYTES {
                return Err(RecordError::Malformed("value size exceeds cap"));
            }
            body.write_u64::<BigEndian>(value_size)?;
            value_size
        };

        let key = match (dict, key_index) {
            (Some(dict), Some(idx)) => dict
                .resolve(idx)
                .ok_or(RecordError::UnknownKeyIndex(idx))?
                .to_string(),
            _ => {
                let mut key_buf = vec![0u8; key_size as usize];
                if read_exact_eof(r, &mut key_buf)?.is_none() {
                    return Ok(None);
                }
                body.extend_from_slice(&key_buf);
                String::from_utf8(key_buf)
                    .map_err(|_| RecordError::Malformed("key is not valid UTF-8"))?
            }
        };

        let value = if tombstone {
            Vec::new()
        } else {
            let mut value_buf = vec![0u8; value_size as usize];
            if read_exact_eof(r, &mut value_buf)?.is_none() {
                return Ok(None);
            }
            body.extend_from_slice(&value_buf);
            value_buf
        };

        let frame_len = 4 + body.len() as u64;
        if crc32fast::hash(&body) != stored_crc {
            return Err(RecordError::Corrupt { frame_len });
        }

        Ok(Some((
            Record {
                timestamp,
                tombstone,
                key,
                value,
            },
            frame_len,
        )))
    }
}

/// Nanoseconds since the UNIX epoch, saturating at i64.
#[must_use]
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

/// Reads one byte; `Ok(None)` on EOF.
fn read_u8_eof<R: Read>(r: &mut R) -> Result<Option<u8>, RecordError> {
    let mut buf = [0u8; 1];
    match r.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf[0])),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `read_exact` that maps a truncated tail to `Ok(None)`.
fn read_exact_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<Option<()>, RecordError> {
    match r.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}
