//! Read path: point lookups and paginated scans.
//!
//! `get` walks three tiers in strict priority order and short-circuits on
//! the first hit: the memtable ring (active first, then the retired
//! slots), the recency cache, then every table newest-first (level 1
//! before level 2, highest sequence first within a level). A tombstone in
//! any tier means "definitely deleted" — the search stops there rather
//! than falling through to older data.
//!
//! Scans interleave one cursor per live source (each memtable, each
//! table), merge-sort the fronts by key with newest-timestamp dedup, drop
//! tombstoned winners, and page the result — no source is ever re-scanned
//! from the start while a page is assembled.

use anyhow::Result;
use memtable::{Memtable, MemtableIter};
use record::{KeyDictionary, Record};
use sstable::Table;

use crate::Engine;

impl Engine {
    /// Looks up `key`. `Ok(None)` means absent or deleted — distinguishable
    /// from an `Err`, which is always a real failure.
    pub fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        // 1. Memtable ring: from the active table backward, skipping
        //    empties. Any resident record ends the search.
        let count = self.memtables.len();
        for offset in 0..count {
            let idx = (self.active + count - offset) % count;
            let mem = &self.memtables[idx];
            if mem.is_empty() {
                continue;
            }
            if let Some(rec) = mem.search(key) {
                return Ok(live_value(rec));
            }
        }

        // 2. Recency cache (refreshes recency on hit).
        if let Some(rec) = self.cache.get(key) {
            return Ok(live_value(rec));
        }

        // 3. Tables, newest first; the filter probe inside `search` skips
        //    tables that definitely lack the key.
        let dict = self.dict_ref();
        for table in self.levels.tables() {
            if let Some(rec) = table.search(key, dict)? {
                return Ok(live_value(&rec));
            }
        }

        Ok(None)
    }

    /// Page `page_number` (1-based) of all live keys starting with
    /// `prefix`, in ascending key order.
    pub fn prefix_scan(
        &self,
        prefix: &str,
        page_number: usize,
        page_size: usize,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        self.scan(&ScanBound::Prefix(prefix), page_number, page_size)
    }

    /// Page `page_number` (1-based) of all live keys in the inclusive
    /// range `[start, end]`, in ascending key order.
    pub fn range_scan(
        &self,
        start: &str,
        end: &str,
        page_number: usize,
        page_size: usize,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        self.scan(&ScanBound::Range { start, end }, page_number, page_size)
    }

    fn scan(
        &self,
        bound: &ScanBound<'_>,
        page_number: usize,
        page_size: usize,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let page_number = page_number.max(1);
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let dict = self.dict_ref();

        // One cursor per source, in priority order: memtables from the
        // active slot backward, then tables newest-first. The order is the
        // tiebreaker when two sources carry the same key and timestamp.
        let mut sources = Vec::new();
        let count = self.memtables.len();
        for offset in 0..count {
            let idx = (self.active + count - offset) % count;
            if let Some(src) = SourceCursor::from_memtable(&self.memtables[idx], bound) {
                sources.push(src);
            }
        }
        for table in self.levels.tables() {
            if let Some(src) = SourceCursor::from_table(table, bound, dict)? {
                sources.push(src);
            }
        }

        let skip = (page_number - 1) * page_size;
        let needed = skip + page_size;
        let mut live_seen = 0usize;
        let mut page = Vec::new();

        while !sources.is_empty() && live_seen < needed {
            // Smallest front key; among equal keys, the newest timestamp
            // wins and the earliest source breaks exact ties.
            let mut best: Option<usize> = None;
            for (i, src) in sources.iter().enumerate() {
                let front = src.front.as_ref().expect("exhausted sources are dropped");
                best = match best {
                    None => Some(i),
                    Some(b) => {
                        let leader = sources[b].front.as_ref().expect("candidate has front");
                        let wins = front.key.as_str() < leader.key.as_str()
                            || (front.key == leader.key && front.timestamp > leader.timestamp);
                        if wins {
                            Some(i)
                        } else {
                            Some(b)
                        }
                    }
                };
            }
            let best = best.expect("loop guard: sources not empty");
            let winner = sources[best]
                .front
                .clone()
                .expect("exhausted sources are dropped");

            for src in &mut sources {
                if src.front.as_ref().map(|f| f.key == winner.key).unwrap_or(false) {
                    src.advance(bound, dict)?;
                }
            }
            sources.retain(|s| s.front.is_some());

            if !winner.tombstone {
                live_seen += 1;
                if live_seen > skip {
                    page.push((winner.key, winner.value));
                }
            }
        }

        Ok(page)
    }
}

fn live_value(rec: &Record) -> Option<Vec<u8>> {
    (!rec.tombstone).then(|| rec.value.clone())
}

/// What a scan matches against.
enum ScanBound<'q> {
    Prefix(&'q str),
    Range { start: &'q str, end: &'q str },
}

impl ScanBound<'_> {
    fn lower(&self) -> &str {
        match self {
            ScanBound::Prefix(p) => p,
            ScanBound::Range { start, .. } => start,
        }
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            ScanBound::Prefix(p) => key.starts_with(p),
            ScanBound::Range { start, end } => key >= *start && key <= *end,
        }
    }
}

/// One source's scan position: its current front record and the state
/// needed to pull the next one.
struct SourceCursor<'a> {
    kind: SourceKind<'a>,
    front: Option<Record>,
}

enum SourceKind<'a> {
    Mem(MemtableIter<'a>),
    Table { table: &'a Table, cursor: u64 },
}

impl<'a> SourceCursor<'a> {
    /// Positions a cursor on the memtable's first match; `None` when it
    /// has none.
    fn from_memtable(mem: &'a Memtable, bound: &ScanBound<'_>) -> Option<Self> {
        let mut iter = mem.iter();
        let front = find_mem_front(&mut iter, bound)?;
        Some(Self {
            kind: SourceKind::Mem(iter),
            front: Some(front),
        })
    }

    /// Positions a cursor on the table's first match via the summary →
    /// index → data narrowing; `None` when it has none.
    fn from_table(
        table: &'a Table,
        bound: &ScanBound<'_>,
        dict: Option<&KeyDictionary>,
    ) -> Result<Option<Self>> {
        let found = match bound {
            ScanBound::Prefix(p) => table.find_first_prefix(p, dict)?,
            ScanBound::Range { start, end } => table.find_first_range(start, end, dict)?,
        };
        Ok(found.map(|(front, cursor)| Self {
            kind: SourceKind::Table { table, cursor },
            front: Some(front),
        }))
    }

    fn advance(&mut self, bound: &ScanBound<'_>, dict: Option<&KeyDictionary>) -> Result<()> {
        match &mut self.kind {
            SourceKind::Mem(iter) => {
                self.front = iter
                    .next()
                    .filter(|rec| bound.matches(&rec.key))
                    .cloned();
            }
            SourceKind::Table { table, cursor } => {
                let next = match bound {
                    ScanBound::Prefix(p) => table.next_prefix(p, *cursor, dict)?,
                    ScanBound::Range { end, .. } => table.next_range(end, *cursor, dict)?,
                };
                match next {
                    Some((rec, pos)) => {
                        *cursor = pos;
                        self.front = Some(rec);
                    }
                    None => self.front = None,
                }
            }
        }
        Ok(())
    }
}

/// Skips the iterator to the first record inside `bound`; `None` when the
/// memtable has no match.
fn find_mem_front(iter: &mut MemtableIter<'_>, bound: &ScanBound<'_>) -> Option<Record> {
    let lower = bound.lower();
    for rec in iter {
        if rec.key.as_str() < lower {
            continue;
        }
        return bound.matches(&rec.key).then(|| rec.clone());
    }
    None
}
