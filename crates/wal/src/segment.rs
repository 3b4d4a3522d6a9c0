//! Resumable reader over the whole segment sequence.
//!
//! Reassembling a logical record whose bytes cross a segment-file boundary
//! is inherently stateful. Rather than teaching every field decoder about
//! boundaries, [`SegmentChain`] presents all segments as one continuous
//! `Read` stream: when the current file runs dry it transparently opens the
//! next one, so `Record::read_from` never notices the seams.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

/// One continuous byte stream over an ordered list of segment files.
pub struct SegmentChain {
    /// Segments not yet opened, in read order (reversed for cheap pop).
    pending: Vec<PathBuf>,
    current: Option<BufReader<File>>,
}

impl SegmentChain {
    /// Builds a chain over `paths` in the given order. Files are opened
    /// lazily, one at a time.
    pub fn open(mut paths: Vec<PathBuf>) -> io::Result<Self> {
        paths.reverse();
        Ok(Self {
            pending: paths,
            current: None,
        })
    }

    /// Opens the next pending segment; `false` when none remain.
    fn advance(&mut self) -> io::Result<bool> {
        match self.pending.pop() {
            Some(path) => {
                self.current = Some(BufReader::new(File::open(path)?));
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }
}

impl Read for SegmentChain {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.current.is_none() && !self.advance()? {
                return Ok(0);
            }
            let reader = self.current.as_mut().expect("just ensured");
            let n = reader.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            // Current segment exhausted; fall through to the next one.
            self.current = None;
        }
    }
}
