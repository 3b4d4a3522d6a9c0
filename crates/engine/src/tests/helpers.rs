use config::Config;
use std::path::Path;

use crate::Engine;

/// Tiny limits so a handful of puts exercises rotation, flush and
/// compaction.
pub fn small_cfg(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.data_dir = dir.to_path_buf();
    cfg.wal_segment_size = 64;
    cfg.index_interval = 2;
    cfg.summary_interval = 2;
    cfg.memtable_capacity = 2;
    cfg.memtable_count = 2;
    cfg.cache_capacity = 1;
    cfg.level_table_limit = 4;
    cfg
}

pub fn open_engine(dir: &Path) -> Engine {
    Engine::open(small_cfg(dir)).unwrap()
}
