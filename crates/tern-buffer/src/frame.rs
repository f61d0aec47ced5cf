//! Buffer frame management.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tern_common::page::{new_page_data, FrameId, PageData, PageId};
use tern_common::Result;
use tern_storage::{DiskRequest, DiskScheduler};

/// A frame in the buffer pool holding a single page.
///
/// Each frame owns:
/// - The page bytes behind a reader-writer latch (`Arc`-wrapped so that
///   guards can hold the latch for their whole lifetime)
/// - A pin count tracking live guards
/// - A dirty flag behind a short data latch
pub struct FrameHeader {
    /// Frame identifier, immutable after construction.
    frame_id: FrameId,
    /// Page data behind the frame's rwlatch.
    data: Arc<RwLock<PageData>>,
    /// Number of live guards referencing this frame.
    pin_count: AtomicU32,
    /// Dirty flag; transitions only under this data latch.
    dirty: Mutex<bool>,
}

impl FrameHeader {
    /// Creates a new empty frame.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            data: Arc::new(RwLock::new(new_page_data())),
            pin_count: AtomicU32::new(0),
            dirty: Mutex::new(false),
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Handle to the rwlatch guarding the page bytes.
    ///
    /// Guards take owned (`read_arc`/`write_arc`) locks on this handle.
    #[inline]
    pub(crate) fn data_handle(&self) -> &Arc<RwLock<PageData>> {
        &self.data
    }

    /// Increments the pin count and returns the prior count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Decrements the pin count and returns the prior count.
    ///
    /// Callers detect the last-release transition by observing a prior
    /// count of 1.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prior = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prior > 0, "unpin of an unpinned frame");
        prior
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Returns true if this frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        *self.dirty.lock()
    }

    /// Sets the dirty flag under the data latch.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        *self.dirty.lock() = dirty;
    }

    /// Copies data into the frame.
    pub fn copy_from(&self, src: &[u8]) {
        let mut data = self.data.write();
        let len = src.len().min(data.len());
        data[..len].copy_from_slice(&src[..len]);
    }

    /// Copies the frame's bytes out into an owned buffer.
    pub fn snapshot(&self) -> Bytes {
        let data = self.data.read();
        Bytes::copy_from_slice(&data[..])
    }

    /// Resets the frame to its empty state.
    ///
    /// Only called on frames with no live guards.
    pub fn reset(&self) {
        self.pin_count.store(0, Ordering::Release);
        *self.dirty.lock() = false;
        self.data.write().fill(0);
    }

    /// Flushes `data` (the caller's view of this frame's bytes) to disk if
    /// the frame is dirty, waiting for the write to complete.
    ///
    /// The dirty flag is cleared under the data latch before the request is
    /// scheduled; the latch is never held across I/O. A failed flush
    /// restores the flag so the write can be retried. Returns whether a
    /// write was performed.
    pub(crate) fn flush_bytes(
        &self,
        page_id: PageId,
        data: &[u8],
        scheduler: &DiskScheduler,
    ) -> Result<bool> {
        {
            let mut dirty = self.dirty.lock();
            if !*dirty {
                return Ok(false);
            }
            *dirty = false;
        }

        let (promise, future) = DiskScheduler::create_promise();
        scheduler.schedule(DiskRequest::Write {
            page_id,
            data: Bytes::copy_from_slice(data),
            promise,
        });

        match future.wait() {
            Ok(()) => Ok(true),
            Err(e) => {
                self.set_dirty(true);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("frame_id", &self.frame_id)
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}
