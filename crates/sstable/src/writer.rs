//! Table construction: streams sorted records into the five companion
//! files.
//!
//! Records are written to the data file one at a time; every
//! `index_interval` records an index entry is accumulated in memory, the
//! index is condensed into the summary at `summary_interval` granularity,
//! a bloom filter collects every key, and a hash tree digests every
//! serialized record. All five files are first written as `.tmp` and
//! renamed into place only after everything fsynced, so an interrupted
//! build never leaves a half-visible table.

use anyhow::{bail, Context, Result};
use bloom::BloomFilter;
use config::Config;
use merkle::MerkleBuilder;
use record::{KeyDictionary, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::files::{index_entry_len, write_index_entry, write_summary_entry, TableFile, TableId};

/// Stateless table writer; all work happens inside [`TableBuilder::build`].
pub struct TableBuilder;

impl TableBuilder {
    /// Writes one table from `records`, which must yield **ascending,
    /// unique** keys (last-writer-wins is already resolved by the memtable
    /// drain or the compaction merge that feeds this).
    ///
    /// `expected_count` sizes the bloom filter; over-estimating is safe,
    /// under-estimating only raises the false-positive rate.
    ///
    /// With `cfg.key_compression` set, data records store 2-byte dictionary
    /// indices instead of raw keys; `dict` is extended on first use of each
    /// key and must be persisted by the caller alongside the table.
    ///
    /// # Errors
    ///
    /// Fails on an empty input (an empty table is a logic bug upstream) and
    /// on any I/O failure; the `.tmp` files are removed on the error paths.
    pub fn build<I>(
        dir: &Path,
        id: TableId,
        expected_count: usize,
        records: I,
        cfg: &Config,
        dict: &mut KeyDictionary,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
    {
        fs::create_dir_all(dir)?;
        let build = BuildFiles::new(dir, id);
        match Self::build_inner(&build, expected_count, records, cfg, dict) {
            Ok(count) => {
                build.commit()?;
                debug!(
                    level = id.level,
                    seq = id.seq,
                    records = count,
                    "sstable written"
                );
                Ok(())
            }
            Err(e) => {
                build.abort();
                Err(e)
            }
        }
    }

    fn build_inner<I>(
        build: &BuildFiles,
        expected_count: usize,
        records: I,
        cfg: &Config,
        dict: &mut KeyDictionary,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut data = BufWriter::new(create_file(&build.tmp(TableFile::Data))?);

        let mut filter = BloomFilter::new(expected_count.max(1), cfg.bloom_fpr);
        let mut tree = MerkleBuilder::new();
        let mut index: Vec<(String, u64)> = Vec::new();

        let mut offset = 0u64;
        let mut count = 0usize;
        let mut frame = Vec::with_capacity(256);

        for rec in records {
            frame.clear();
            if cfg.key_compression {
                rec.write_compressed(&mut frame, dict)?;
            } else {
                rec.write_to(&mut frame)?;
            }
            data.write_all(&frame)?;
            tree.add(&frame);
            filter.insert(rec.key.as_bytes());

            if count % cfg.index_interval == 0 {
                index.push((rec.key.clone(), offset));
            }
            offset += frame.len() as u64;
            count += 1;
        }

        if count == 0 {
            bail!("refusing to write an empty sstable");
        }

        finish_file(data)?;

        // Index file: the in-memory entries, serialized back to back.
        let mut index_file = BufWriter::new(create_file(&build.tmp(TableFile::Index))?);
        for (key, data_offset) in &index {
            write_index_entry(&mut index_file, key, *data_offset)?;
        }
        finish_file(index_file)?;

        // Summary: one entry per summary_interval index entries, each
        // recording the chunk's key range and its byte offset in the
        // index file.
        let mut summary_file = BufWriter::new(create_file(&build.tmp(TableFile::Summary))?);
        let mut index_offset = 0u64;
        for chunk in index.chunks(cfg.summary_interval) {
            let first = &chunk[0].0;
            let last = &chunk[chunk.len() - 1].0;
            write_summary_entry(&mut summary_file, first, last, index_offset)?;
            index_offset += chunk.iter().map(|(k, _)| index_entry_len(k)).sum::<u64>();
        }
        finish_file(summary_file)?;

        let mut filter_file = BufWriter::new(create_file(&build.tmp(TableFile::Filter))?);
        filter
            .write_to(&mut filter_file)
            .context("writing bloom filter")?;
        finish_file(filter_file)?;

        let mut meta_file = BufWriter::new(create_file(&build.tmp(TableFile::Metadata))?);
        tree.build()
            .write_to(&mut meta_file)
            .context("writing hash tree")?;
        finish_file(meta_file)?;

        Ok(count)
    }
}

/// The five `.tmp` destinations of one build, plus commit/abort.
struct BuildFiles {
    dir: PathBuf,
    id: TableId,
}

impl BuildFiles {
    fn new(dir: &Path, id: TableId) -> Self {
        Self {
            dir: dir.to_path_buf(),
            id,
        }
    }

    fn tmp(&self, file: TableFile) -> PathBuf {
        let final_path = self.id.path(&self.dir, file);
        tmp_path(&final_path)
    }

    /// Renames all five files into place, then fsyncs the directory so the
    /// renames themselves are durable.
    fn commit(&self) -> Result<()> {
        for file in TableFile::ALL {
            let dst = self.id.path(&self.dir, file);
            fs::rename(tmp_path(&dst), &dst)
                .with_context(|| format!("publishing {}", dst.display()))?;
        }
        if let Ok(d) = File::open(&self.dir) {
            let _ = d.sync_all();
        }
        Ok(())
    }

    /// Best-effort removal of whatever `.tmp` files the failed build left.
    fn abort(&self) {
        for file in TableFile::ALL {
            let _ = fs::remove_file(tmp_path(&self.id.path(&self.dir, file)));
        }
    }
}

fn tmp_path(final_path: &Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

fn create_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))
}

fn finish_file(w: BufWriter<File>) -> Result<()> {
    let f = w.into_inner().context("flushing table file")?;
    f.sync_all()?;
    Ok(())
}
