//! Multi-way merge over table record streams — the compaction core.
//!
//! All source streams are open simultaneously. Each round picks, among the
//! current front record of every stream, the one with the smallest key —
//! ties broken by newest timestamp, then by stream order (pass streams
//! **newest table first** so an exact timestamp tie resolves to the newer
//! table). The winner is emitted once; every stream whose front carries
//! the winning key is advanced past it, which is how superseded older
//! versions are silently discarded without ever being written. Exhausted
//! streams drop out of the candidate set; the merge ends when none remain.

use anyhow::Result;
use record::Record;

use crate::reader::RecordStream;

/// Pull-based merged view over any number of sorted record streams.
pub struct StreamMerger<'a> {
    /// Newest table first — the order is the timestamp tiebreaker.
    streams: Vec<RecordStream<'a>>,
}

impl<'a> StreamMerger<'a> {
    /// Builds a merger; `streams` must be ordered newest table first.
    #[must_use]
    pub fn new(streams: Vec<RecordStream<'a>>) -> Self {
        Self { streams }
    }

    /// Emits the next merged record, or `None` when every stream is
    /// exhausted. Exactly one record per distinct key comes out, and it is
    /// always the newest version among the sources.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        // Pick the winner: smallest key, newest timestamp. Strict
        // comparisons keep the earliest (newest) stream on full ties.
        let mut best: Option<usize> = None;
        for (i, stream) in self.streams.iter().enumerate() {
            let Some(front) = stream.front() else {
                continue;
            };
            best = match best {
                None => Some(i),
                Some(b) => {
                    let leader = self.streams[b].front().expect("candidate has a front");
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

        let Some(best) = best else {
            return Ok(None);
        };
        let winner = self.streams[best]
            .front()
            .expect("winning stream has a front")
            .clone();

        // Advance every stream whose front matched the winning key — the
        // superseded versions vanish here.
        for stream in &mut self.streams {
            if stream.front().map(|f| f.key == winner.key).unwrap_or(false) {
                stream.advance()?;
            }
        }
        self.streams.retain(|s| s.front().is_some());

        Ok(Some(winner))
    }

    /// Drains the merge into a `Vec` (test helper).
    pub fn collect_all(&mut self) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(rec) = self.next_record()? {
            out.push(rec);
        }
        Ok(out)
    }
}
