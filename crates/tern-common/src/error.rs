//! Error types for TernDB.

use crate::page::{FrameId, PageId};
use thiserror::Error;

/// Result type alias using TernError.
pub type Result<T> = std::result::Result<T, TernError>;

/// Errors that can occur in TernDB operations.
#[derive(Debug, Error)]
pub enum TernError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disk request failed: {0}")]
    IoFailed(String),

    // Buffer pool errors
    #[error("buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("page not found: {page_id}")]
    PageNotFound { page_id: PageId },

    #[error("invalid page id: {page_id}")]
    InvalidPageId { page_id: PageId },

    // Replacer errors
    #[error("frame {frame_id} out of range (capacity {capacity})")]
    FrameOutOfRange { frame_id: FrameId, capacity: usize },

    #[error("frame {frame_id} is not evictable")]
    FrameNotEvictable { frame_id: FrameId },

    // Scheduler errors
    #[error("disk scheduler shut down before completing the request")]
    SchedulerShutdown,

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}
