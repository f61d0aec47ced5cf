//! Scoped page guards.
//!
//! Guards are issued by the buffer pool manager, which pins the frame and
//! resolves its data before construction. A guard holds the frame's
//! rwlatch for its whole lifetime; dropping it releases the latch,
//! unpins the frame, and marks the frame evictable once the last pin is
//! gone. Guards move freely across threads but cannot be copied.

use crate::frame::FrameHeader;
use crate::pool::PoolInner;
use crate::replacer::{AccessType, LruKReplacer, Replacer};
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock};
use std::sync::Arc;
use tern_common::page::{PageData, PageId};
use tern_common::Result;
use tern_storage::DiskScheduler;

/// Decrements the frame's pin count; the releaser that observes the 1 -> 0
/// transition re-checks under the pool latch and marks the frame
/// evictable. The re-check is required because another thread may have
/// re-pinned the frame between the decrement and the lock acquisition.
fn unpin_and_mark(
    frame: &FrameHeader,
    replacer: &LruKReplacer,
    pool_latch: &Mutex<PoolInner>,
) {
    let prior = frame.unpin();
    if prior == 1 {
        let _pool = pool_latch.lock();
        if frame.pin_count() == 0 {
            replacer.set_evictable(frame.frame_id(), true);
        }
    }
}

/// Shared, read-only access to a pinned page.
///
/// The shared rwlatch is held until the guard is dropped.
pub struct ReadPageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    replacer: Arc<LruKReplacer>,
    pool_latch: Arc<Mutex<PoolInner>>,
    scheduler: Arc<DiskScheduler>,
    /// Held latch over the frame bytes; `None` once released.
    data: Option<ArcRwLockReadGuard<RawRwLock, PageData>>,
}

impl ReadPageGuard {
    /// Constructs a guard for a frame the pool has already pinned and
    /// loaded. Pool-only.
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        replacer: Arc<LruKReplacer>,
        pool_latch: Arc<Mutex<PoolInner>>,
        scheduler: Arc<DiskScheduler>,
    ) -> Self {
        let data = frame.data_handle().read_arc();
        replacer
            .record_access(frame.frame_id(), AccessType::Unknown)
            .expect("pool frame id within replacer capacity");

        Self {
            page_id,
            frame,
            replacer,
            pool_latch,
            scheduler,
            data: Some(data),
        }
    }

    fn latch(&self) -> &ArcRwLockReadGuard<RawRwLock, PageData> {
        self.data.as_ref().expect("used a released page guard")
    }

    /// Returns the ID of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        &self.latch()[..]
    }

    /// Returns whether the page has unflushed modifications.
    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }

    /// Writes the page to disk if it is dirty, blocking until the disk
    /// scheduler completes the request.
    ///
    /// A read guard may flush: the dirty bit it observes was inherited
    /// from an earlier writer, and synchronizing it requires no mutation
    /// of the page bytes. A failed flush leaves the page dirty for retry.
    pub fn flush(&self) -> Result<()> {
        self.frame
            .flush_bytes(self.page_id, self.data(), &self.scheduler)?;
        Ok(())
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        let Some(latch) = self.data.take() else {
            return;
        };
        drop(latch);
        unpin_and_mark(&self.frame, &self.replacer, &self.pool_latch);
    }
}

/// Exclusive, read-write access to a pinned page.
///
/// The exclusive rwlatch is held until the guard is dropped. Dropping the
/// guard marks the page dirty unconditionally: a write guard is presumed
/// to have modified the page, and the pool never diffs buffers to find
/// out.
pub struct WritePageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    replacer: Arc<LruKReplacer>,
    pool_latch: Arc<Mutex<PoolInner>>,
    scheduler: Arc<DiskScheduler>,
    /// Held latch over the frame bytes; `None` once released.
    data: Option<ArcRwLockWriteGuard<RawRwLock, PageData>>,
}

impl WritePageGuard {
    /// Constructs a guard for a frame the pool has already pinned and
    /// loaded. Pool-only.
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        replacer: Arc<LruKReplacer>,
        pool_latch: Arc<Mutex<PoolInner>>,
        scheduler: Arc<DiskScheduler>,
    ) -> Self {
        let data = frame.data_handle().write_arc();
        replacer
            .record_access(frame.frame_id(), AccessType::Unknown)
            .expect("pool frame id within replacer capacity");

        Self {
            page_id,
            frame,
            replacer,
            pool_latch,
            scheduler,
            data: Some(data),
        }
    }

    fn latch(&self) -> &ArcRwLockWriteGuard<RawRwLock, PageData> {
        self.data.as_ref().expect("used a released page guard")
    }

    /// Returns the ID of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        &self.latch()[..]
    }

    /// Returns the page bytes for mutation.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let latch = self.data.as_mut().expect("used a released page guard");
        &mut latch[..]
    }

    /// Returns whether the page has unflushed modifications.
    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }

    /// Writes the page to disk if it is dirty, blocking until the disk
    /// scheduler completes the request.
    ///
    /// A failed flush leaves the page dirty for retry.
    pub fn flush(&self) -> Result<()> {
        self.frame
            .flush_bytes(self.page_id, self.data(), &self.scheduler)?;
        Ok(())
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        let Some(latch) = self.data.take() else {
            return;
        };
        // Mark dirty under the data latch before the exclusive latch is
        // released, so no reader can observe a clean flag on bytes this
        // guard may have changed.
        self.frame.set_dirty(true);
        drop(latch);
        unpin_and_mark(&self.frame, &self.replacer, &self.pool_latch);
    }
}
