//! Probabilistic skip list, arena-allocated.
//!
//! Nodes live in one `Vec` and point at each other by index, so splicing a
//! tower is a handful of index assignments with no ownership cycles. Node 0
//! is the head sentinel: it holds no record and its tower spans the full
//! configured height.
//!
//! ```text
//! level 2:  HEAD ----------------> "m" ------------------> (none)
//! level 1:  HEAD ----> "d" ------> "m" ----> "s" --------> (none)
//! level 0:  HEAD -> "a" -> "d" -> "m" -> "p" -> "s" -> "z"
//! ```
//!
//! Tower heights come from independent fair coin flips, capped at the
//! configured maximum. Search descends from the highest populated level,
//! moving forward while the next key is less than the target and dropping
//! a level on failure.

use rand::Rng;
use record::Record;

#[derive(Debug)]
struct Node {
    /// `None` only for the head sentinel.
    record: Option<Record>,
    /// Forward pointers, one per tower level; arena indices.
    next: Vec<Option<usize>>,
}

/// Arena-backed skip list keyed by `Record::key`.
#[derive(Debug)]
pub struct SkipList {
    nodes: Vec<Node>,
    max_height: usize,
    /// Highest populated level + 1 (i.e. the number of levels in use).
    height: usize,
    len: usize,
}

impl SkipList {
    /// Creates an empty list whose towers never exceed `max_height` levels.
    #[must_use]
    pub fn new(max_height: usize) -> Self {
        let max_height = max_height.max(1);
        Self {
            nodes: vec![Node {
                record: None,
                next: vec![None; max_height],
            }],
            max_height,
            height: 1,
            len: 0,
        }
    }

    /// Number of records resident.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no record is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Walks down from the top level to the level-0 predecessor of `key`.
    /// Returns the predecessor index and, when requested, the per-level
    /// update path needed for splicing.
    fn descend(&self, key: &str, mut path: Option<&mut Vec<usize>>) -> usize {
        let mut cur = 0usize;
        for level in (0..self.height).rev() {
            while let Some(nxt) = self.nodes[cur].next[level] {
                let nxt_key = self.nodes[nxt]
                    .record
                    .as_ref()
                    .expect("non-head nodes always carry a record")
                    .key
                    .as_str();
                if nxt_key < key {
                    cur = nxt;
                } else {
                    break;
                }
            }
            if let Some(path) = path.as_deref_mut() {
                path[level] = cur;
            }
        }
        cur
    }

    /// Looks up `key`.
    #[must_use]
    pub fn search(&self, key: &str) -> Option<&Record> {
        let pred = self.descend(key, None);
        let candidate = self.nodes[pred].next[0]?;
        let rec = self.nodes[candidate].record.as_ref()?;
        (rec.key == key).then_some(rec)
    }

    /// Mutable lookup, used for in-place tombstone flips.
    pub fn search_mut(&mut self, key: &str) -> Option<&mut Record> {
        let pred = self.descend(key, None);
        let candidate = self.nodes[pred].next[0]?;
        let rec = self.nodes[candidate].record.as_mut()?;
        (rec.key == key).then_some(rec)
    }

    /// Inserts `rec`, replacing in place when the key is already resident.
    pub fn insert(&mut self, rec: Record) {
        let mut path = vec![0usize; self.max_height];
        let pred = self.descend(&rec.key, Some(&mut path));

        if let Some(candidate) = self.nodes[pred].next[0] {
            if let Some(existing) = self.nodes[candidate].record.as_mut() {
                if existing.key == rec.key {
                    *existing = rec;
                    return;
                }
            }
        }

        let tower = self.roll_height();
        if tower > self.height {
            for level in self.height..tower {
                path[level] = 0;
            }
            self.height = tower;
        }

        let new_idx = self.nodes.len();
        let mut next = vec![None; tower];
        for (level, slot) in next.iter_mut().enumerate() {
            *slot = self.nodes[path[level]].next[level];
        }
        self.nodes.push(Node {
            record: Some(rec),
            next,
        });
        for level in 0..tower {
            self.nodes[path[level]].next[level] = Some(new_idx);
        }
        self.len += 1;
    }

    /// Destructively drains every record in ascending key order and resets
    /// the list to empty.
    pub fn flush(&mut self) -> Vec<Record> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.nodes[0].next[0];
        while let Some(idx) = cur {
            cur = self.nodes[idx].next[0];
            out.push(
                self.nodes[idx]
                    .record
                    .take()
                    .expect("chain nodes always carry a record"),
            );
        }

        self.nodes.truncate(1);
        self.nodes[0].next = vec![None; self.max_height];
        self.height = 1;
        self.len = 0;
        out
    }

    /// Ascending iteration over the level-0 chain.
    pub fn iter(&self) -> SkipListIter<'_> {
        SkipListIter {
            list: self,
            cur: self.nodes[0].next[0],
        }
    }

    /// Independent fair coin flips, at least one level, capped at the
    /// configured maximum.
    fn roll_height(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut h = 1;
        while h < self.max_height && rng.gen_bool(0.5) {
            h += 1;
        }
        h
    }
}

/// Iterator over the level-0 chain.
pub struct SkipListIter<'a> {
    list: &'a SkipList,
    cur: Option<usize>,
}

impl<'a> Iterator for SkipListIter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cur?;
        self.cur = self.list.nodes[idx].next[0];
        self.list.nodes[idx].record.as_ref()
    }
}
