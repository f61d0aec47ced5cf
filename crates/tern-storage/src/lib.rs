//! Disk layer for TernDB.
//!
//! This crate provides:
//! - Page-level file I/O through the [`DiskManager`]
//! - A single-worker [`DiskScheduler`] that serializes read/write requests
//!   and completes a per-request promise

mod disk;
mod scheduler;

pub use disk::DiskManager;
pub use scheduler::{DiskFuture, DiskPromise, DiskRequest, DiskScheduler, SharedPageBuf};
