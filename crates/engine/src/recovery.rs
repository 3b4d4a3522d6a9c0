//! Startup recovery: WAL replay through the memtable ring.
//!
//! The log holds every mutation not yet reflected in a flushed table.
//! Replaying in **original write order** through the same ring-rotation
//! path the live write path uses reproduces the exact pre-crash state —
//! including any flush that was due, which also re-truncates the log.
//! Records are not re-appended: they are already in the log.

use anyhow::Result;
use tracing::info;

use crate::Engine;

impl Engine {
    /// Rebuilds the memtable ring from the WAL. Corrupt records were
    /// already dropped (with diagnostics) by the log reader.
    pub(crate) fn recover(&mut self) -> Result<()> {
        let records = self.wal.load_all()?;
        if records.is_empty() {
            return Ok(());
        }
        let replayed = records.len();
        for rec in records {
            self.insert_to_ring(rec)?;
        }
        info!(replayed, "wal replay complete");
        Ok(())
    }
}
