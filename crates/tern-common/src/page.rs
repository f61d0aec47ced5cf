//! Page and frame identity for TernDB storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// A page-sized byte buffer, boxed to keep frames off the stack.
pub type PageData = Box<[u8; PAGE_SIZE]>;

/// Allocates a zeroed page buffer.
pub fn new_page_data() -> PageData {
    Box::new([0u8; PAGE_SIZE])
}

/// Unique identifier for a page in the database file.
///
/// Page IDs are non-negative; negative values are sentinels and never
/// reach the disk layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub i32);

impl PageId {
    /// Invalid page ID.
    pub const INVALID: PageId = PageId(-1);

    /// Creates a new PageId.
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns true if this is a valid (non-negative) page ID.
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    /// Byte offset of this page in the database file.
    pub fn offset(&self) -> u64 {
        debug_assert!(self.is_valid());
        (self.0 as u64) * (PAGE_SIZE as u64)
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Unique identifier for a frame in the buffer pool.
///
/// Frame IDs are dense indices in `0..num_frames`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: FrameId = FrameId(u32::MAX);

    /// Returns true if this is a valid frame ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Returns the frame ID as a slot index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}
