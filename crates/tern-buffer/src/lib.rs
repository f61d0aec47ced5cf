//! Buffer pool management for TernDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable page count
//! - LRU-K eviction policy for cache management
//! - Pin counting for concurrent access
//! - RAII page guards with automatic unpin and write-back

mod frame;
mod guard;
mod pool;
mod replacer;

pub use frame::FrameHeader;
pub use guard::{ReadPageGuard, WritePageGuard};
pub use pool::BufferPoolManager;
pub use replacer::{AccessType, LruKReplacer, Replacer};
