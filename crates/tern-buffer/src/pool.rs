//! Buffer pool manager.

use crate::frame::FrameHeader;
use crate::guard::{ReadPageGuard, WritePageGuard};
use crate::replacer::{AccessType, LruKReplacer, Replacer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use sysinfo::System;
use tern_common::page::{new_page_data, FrameId, PageId, PAGE_SIZE};
use tern_common::{BufferPoolConfig, Result, TernError};
use tern_storage::{DiskManager, DiskRequest, DiskScheduler, SharedPageBuf};

/// State behind the pool's global latch: the page table, the free list,
/// and the page currently assigned to each frame. Guards take this latch
/// on their last-unpin path, so membership in the replacer only changes
/// while it is held.
pub(crate) struct PoolInner {
    /// Resident pages mapped to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames not holding any page.
    free_frames: Vec<FrameId>,
    /// Page held by each frame slot, if any.
    frame_pages: Vec<Option<PageId>>,
}

/// Buffer pool manager.
///
/// Mediates between in-memory frames and the disk: resolves pages to
/// frames, loads misses through the disk scheduler, evicts victims chosen
/// by the LRU-K replacer, and hands out pinned page guards.
pub struct BufferPoolManager {
    /// Number of frames in the pool.
    num_frames: usize,
    /// The frame slots, fixed at construction.
    frames: Vec<Arc<FrameHeader>>,
    /// Global latch over the page table and replacer membership.
    inner: Arc<Mutex<PoolInner>>,
    /// Eviction policy.
    replacer: Arc<LruKReplacer>,
    /// Serializes page I/O onto one worker.
    scheduler: Arc<DiskScheduler>,
    /// Next page ID to hand out.
    next_page_id: AtomicI32,
}

impl BufferPoolManager {
    /// Creates a buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk_manager: Arc<DiskManager>) -> Result<Self> {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| Arc::new(FrameHeader::new(FrameId(i as u32))))
            .collect();

        // All frames start free; hand them out lowest-id first.
        let free_frames: Vec<_> = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        // Page IDs continue past whatever the file already holds.
        let next_page_id = disk_manager.num_pages()? as i32;

        Ok(Self {
            num_frames,
            frames,
            inner: Arc::new(Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(num_frames),
                free_frames,
                frame_pages: vec![None; num_frames],
            })),
            replacer: Arc::new(LruKReplacer::new(num_frames, config.lru_k)),
            scheduler: Arc::new(DiskScheduler::new(disk_manager)),
            next_page_id: AtomicI32::new(next_page_id),
        })
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames so low-memory systems still cache usefully.
    pub fn auto_sized(disk_manager: Arc<DiskManager>) -> Result<Self> {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let num_frames = (available_bytes / 4 / PAGE_SIZE).max(1_000);

        Self::new(
            BufferPoolConfig {
                num_frames,
                ..Default::default()
            },
            disk_manager,
        )
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Returns the number of frames not holding any page.
    pub fn free_frame_count(&self) -> usize {
        self.inner.lock().free_frames.len()
    }

    /// Returns the number of frames the replacer could evict right now.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    /// Returns true if the page is resident in the pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.lock();
        let frame_id = inner.page_table.get(&page_id)?;
        Some(self.frames[frame_id.index()].pin_count())
    }

    /// Allocates a fresh page ID.
    ///
    /// No frame is touched; the page materializes on first fetch (reading
    /// as zeroes until something is written).
    pub fn new_page(&self) -> PageId {
        PageId(self.next_page_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Pins `page_id` and returns a shared guard over its bytes.
    ///
    /// Blocks while a writer holds the page. Fails with `BufferPoolFull`
    /// when every frame is pinned.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.pin_frame(page_id)?;
        Ok(ReadPageGuard::new(
            page_id,
            frame,
            Arc::clone(&self.replacer),
            Arc::clone(&self.inner),
            Arc::clone(&self.scheduler),
        ))
    }

    /// Pins `page_id` and returns an exclusive guard over its bytes.
    ///
    /// Blocks while any other guard holds the page. Fails with
    /// `BufferPoolFull` when every frame is pinned.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.pin_frame(page_id)?;
        Ok(WritePageGuard::new(
            page_id,
            frame,
            Arc::clone(&self.replacer),
            Arc::clone(&self.inner),
            Arc::clone(&self.scheduler),
        ))
    }

    /// Infallible variant of [`Self::checked_read_page`]; panics on
    /// failure.
    pub fn read_page(&self, page_id: PageId) -> ReadPageGuard {
        self.checked_read_page(page_id)
            .expect("failed to pin page for reading")
    }

    /// Infallible variant of [`Self::checked_write_page`]; panics on
    /// failure.
    pub fn write_page(&self, page_id: PageId) -> WritePageGuard {
        self.checked_write_page(page_id)
            .expect("failed to pin page for writing")
    }

    /// Resolves a page to a pinned frame, loading it from disk on a miss.
    ///
    /// The guard itself is constructed by the caller after this returns:
    /// rwlatch acquisition may block behind a writer and must not happen
    /// under the global latch.
    fn pin_frame(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if !page_id.is_valid() {
            return Err(TernError::InvalidPageId { page_id });
        }

        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.allocate_frame(&mut inner)?;
        let frame = &self.frames[frame_id.index()];

        if let Err(e) = self.load_page(page_id, frame) {
            inner.free_frames.push(frame_id);
            return Err(e);
        }

        inner.page_table.insert(page_id, frame_id);
        inner.frame_pages[frame_id.index()] = Some(page_id);
        frame.pin();
        self.replacer.set_evictable(frame_id, false);
        Ok(Arc::clone(frame))
    }

    /// Takes a free frame, or evicts the replacer's victim.
    ///
    /// A dirty victim is written back before its frame is recycled.
    fn allocate_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_frames.pop() {
            return Ok(frame_id);
        }

        let victim_id = self.replacer.evict().ok_or(TernError::BufferPoolFull)?;
        let victim = &self.frames[victim_id.index()];

        if let Some(old_page_id) = inner.frame_pages[victim_id.index()] {
            if let Err(e) = self.flush_frame(victim, old_page_id) {
                // Put the victim back; its history restarts but the page
                // stays resident and dirty.
                self.replacer
                    .record_access(victim_id, AccessType::Unknown)
                    .expect("pool frame id within replacer capacity");
                self.replacer.set_evictable(victim_id, true);
                return Err(e);
            }
            inner.page_table.remove(&old_page_id);
        }

        inner.frame_pages[victim_id.index()] = None;
        victim.reset();
        Ok(victim_id)
    }

    /// Loads a page's on-disk bytes into a frame through the scheduler.
    fn load_page(&self, page_id: PageId, frame: &FrameHeader) -> Result<()> {
        let buf: SharedPageBuf = Arc::new(Mutex::new(new_page_data()));
        let (promise, future) = DiskScheduler::create_promise();
        self.scheduler.schedule(DiskRequest::Read {
            page_id,
            buf: Arc::clone(&buf),
            promise,
        });
        future.wait()?;

        frame.copy_from(&buf.lock()[..]);
        Ok(())
    }

    /// Writes a frame back if dirty, using the guards' flush protocol.
    fn flush_frame(&self, frame: &FrameHeader, page_id: PageId) -> Result<bool> {
        if !frame.is_dirty() {
            return Ok(false);
        }
        let snapshot = frame.snapshot();
        frame.flush_bytes(page_id, &snapshot, &self.scheduler)
    }

    /// Flushes a resident page to disk if dirty.
    ///
    /// Returns whether a write was performed; `Ok(false)` when the page is
    /// clean or not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.flush_frame(&self.frames[frame_id.index()], page_id)
    }

    /// Flushes every dirty resident page.
    ///
    /// Returns the number of pages written.
    pub fn flush_all(&self) -> Result<usize> {
        let inner = self.inner.lock();
        let mut flushed = 0;
        for (&page_id, &frame_id) in &inner.page_table {
            if self.flush_frame(&self.frames[frame_id.index()], page_id)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Drops a page from the pool without writing it back.
    ///
    /// Returns false if the page is pinned, still being released by a
    /// guard, or not resident. The frame returns to the free list.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };

        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        // A releasing guard decrements the pin count before it takes the
        // pool latch to flip the frame evictable. Seeing a zero pin count
        // with a non-evictable node means that release is still in
        // flight: refuse the delete rather than report misuse.
        match self.replacer.remove(frame_id) {
            Ok(()) => {}
            Err(TernError::FrameNotEvictable { .. }) => return Ok(false),
            Err(e) => return Err(e),
        }
        inner.page_table.remove(&page_id);
        inner.frame_pages[frame_id.index()] = None;
        frame.reset();
        inner.free_frames.push(frame_id);
        Ok(true)
    }
}
