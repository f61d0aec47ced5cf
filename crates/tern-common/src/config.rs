//! Configuration structures for TernDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the disk layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the database file.
    pub db_path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/tern.db"),
            fsync_enabled: true,
        }
    }
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
    /// K value for the LRU-K replacement policy.
    pub lru_k: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_frames: 1024,
            lru_k: 2,
        }
    }
}
