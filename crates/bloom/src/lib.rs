//! # Bloom — approximate-membership filter
//!
//! A compact probabilistic set answering "possibly present" or "definitely
//! absent" for a key, with no false negatives and a tunable false-positive
//! rate.
//!
//! ## Usage in SiltKV
//!
//! Every SSTable persists a filter built over all of its keys. The read path
//! probes the filter before touching the summary, index or data files — a
//! negative probe skips the table entirely, which is what keeps point
//! lookups cheap once the tree is several levels deep.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.insert(b"hello");
//! assert!(bf.may_contain(b"hello"));
//! ```

use std::io::{self, Read, Write};
use xxhash_rust::xxh3::xxh3_128_with_seed;

/// A bloom filter backed by a bit vector and `k` derived hash positions.
///
/// Uses double hashing, `h(i) = h1 + i * h2`, with `h1`/`h2` taken from the
/// two halves of one 128-bit xxh3 digest — one hash pass per probe
/// regardless of `k`.
pub struct BloomFilter {
    /// Bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of addressable bits.
    num_bits: u64,
    /// Number of probe positions per key (k).
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the target
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in
    /// `(0, 1)` — both are construction bugs, not runtime conditions.
    #[must_use]
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / ln(2)^2, k = (m/n) * ln(2)
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / (std::f64::consts::LN_2.powi(2))).ceil() as u64;
        let m = m.max(8);
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        Self {
            bits: vec![0u8; m.div_ceil(8) as usize],
            num_bits: m,
            num_hashes: k,
        }
    }

    /// Inserts a key.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = bit_index(h1, h2, i, self.num_bits);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    /// Returns `false` only when the key is definitely absent.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = bit_index(h1, h2, i, self.num_bits);
            if self.bits[(idx / 8) as usize] >> (idx % 8) & 1 == 0 {
                return false;
            }
        }
        true
    }

    /// Number of addressable bits.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of probe positions per key.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Serializes the filter to `w`.
    ///
    /// Wire format (big-endian, like every other SiltKV file):
    ///
    /// ```text
    /// [num_bits: u64][num_hashes: u32][bits_len: u32][bits]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_be_bytes())?;
        w.write_all(&self.num_hashes.to_be_bytes())?;
        w.write_all(&(self.bits.len() as u32).to_be_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter from `r`.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_be_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_be_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let bits_len = u32::from_be_bytes(buf4) as usize;

        // A filter file should never reach this size; refuse to allocate.
        const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;
        if bits_len > MAX_BLOOM_BYTES || num_hashes == 0 || num_bits == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "implausible bloom filter header",
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    /// Whole-buffer form of [`write_to`](BloomFilter::write_to).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.bits.len());
        buf.extend_from_slice(&self.num_bits.to_be_bytes());
        buf.extend_from_slice(&self.num_hashes.to_be_bytes());
        buf.extend_from_slice(&(self.bits.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Whole-buffer form of [`read_from`](BloomFilter::read_from).
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        Self::read_from(&mut io::Cursor::new(bytes))
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// One xxh3-128 pass split into the two 64-bit halves used for double
/// hashing.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h = xxh3_128_with_seed(key, 0);
    ((h >> 64) as u64, h as u64)
}

/// `h(i) = (h1 + i * h2) mod num_bits`, wrapping arithmetic.
fn bit_index(h1: u64, h2: u64, i: u32, num_bits: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % num_bits
}
