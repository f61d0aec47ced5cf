//! Disk scheduler: serializes page I/O onto a single worker thread.
//!
//! Callers build a [`DiskRequest`] carrying a fresh [`DiskPromise`], hand it
//! to [`DiskScheduler::schedule`], and block on the paired [`DiskFuture`].
//! The worker dispatches requests to the [`DiskManager`] strictly in FIFO
//! order, one at a time, and fulfills each promise exactly once.

use crate::disk::DiskManager;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tern_common::page::{PageData, PageId};
use tern_common::{Result, TernError};

/// A page buffer shared between a requester and the worker.
///
/// The requester owns the buffer and must keep it alive until the request's
/// promise is fulfilled. The worker locks only this mutex; it never touches
/// frame or pool latches.
pub type SharedPageBuf = Arc<Mutex<PageData>>;

/// One disk I/O request.
pub enum DiskRequest {
    /// Fill `buf` with the on-disk contents of `page_id`.
    Read {
        page_id: PageId,
        buf: SharedPageBuf,
        promise: DiskPromise,
    },
    /// Persist `data` for `page_id`.
    Write {
        page_id: PageId,
        data: Bytes,
        promise: DiskPromise,
    },
}

struct SlotState {
    result: Mutex<Option<Result<()>>>,
    cond: Condvar,
}

/// Write half of a single-shot completion slot.
///
/// `set` consumes the promise, so a request completes exactly once. A
/// promise dropped without being set (the worker died) completes the slot
/// with [`TernError::SchedulerShutdown`] so the waiter can never hang.
pub struct DiskPromise {
    state: Arc<SlotState>,
    fulfilled: bool,
}

impl DiskPromise {
    /// Fulfills the slot and wakes the waiter.
    pub fn set(mut self, value: Result<()>) {
        self.fulfilled = true;
        let mut slot = self.state.result.lock();
        *slot = Some(value);
        self.state.cond.notify_all();
    }
}

impl Drop for DiskPromise {
    fn drop(&mut self) {
        if !self.fulfilled {
            let mut slot = self.state.result.lock();
            *slot = Some(Err(TernError::SchedulerShutdown));
            self.state.cond.notify_all();
        }
    }
}

/// Read half of a single-shot completion slot.
pub struct DiskFuture {
    state: Arc<SlotState>,
}

impl DiskFuture {
    /// Blocks until the paired promise is fulfilled.
    pub fn wait(self) -> Result<()> {
        let mut slot = self.state.result.lock();
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            self.state.cond.wait(&mut slot);
        }
    }
}

/// Serializes disk requests onto a single background worker.
///
/// The disk manager sees at most one outstanding operation at a time;
/// callers are free to pipeline. Requests execute in the order `schedule`
/// returns, with no reordering or coalescing.
pub struct DiskScheduler {
    /// Request channel; `None` is the shutdown sentinel.
    sender: Sender<Option<DiskRequest>>,
    /// The worker thread, joined on drop.
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("tern-disk-io".to_string())
            .spawn(move || Self::run_worker(disk_manager, receiver))
            .expect("failed to spawn disk scheduler worker");

        Self {
            sender,
            worker: Some(worker),
        }
    }

    /// Produces a fresh completion slot.
    ///
    /// The scheduler retains no reference; the promise travels inside the
    /// request and the future stays with the requester.
    pub fn create_promise() -> (DiskPromise, DiskFuture) {
        let state = Arc::new(SlotState {
            result: Mutex::new(None),
            cond: Condvar::new(),
        });
        (
            DiskPromise {
                state: Arc::clone(&state),
                fulfilled: false,
            },
            DiskFuture { state },
        )
    }

    /// Moves a request into the queue; returns immediately.
    ///
    /// Calling this after the scheduler has shut down is a programmer error
    /// and panics.
    pub fn schedule(&self, request: DiskRequest) {
        self.sender
            .send(Some(request))
            .expect("scheduled a request on a shut-down disk scheduler");
    }

    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<Option<DiskRequest>>) {
        // A failed request completes its promise with the error; the worker
        // keeps draining the queue.
        while let Ok(Some(request)) = receiver.recv() {
            match request {
                DiskRequest::Read {
                    page_id,
                    buf,
                    promise,
                } => {
                    let mut page = buf.lock();
                    let result = disk_manager.read_page(page_id, &mut page);
                    drop(page);
                    promise.set(result.map_err(|e| TernError::IoFailed(e.to_string())));
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    promise,
                } => {
                    let result = disk_manager.write_page(page_id, &data);
                    promise.set(result.map_err(|e| TernError::IoFailed(e.to_string())));
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Sentinel first, then join: in-flight requests complete before the
        // worker exits.
        let _ = self.sender.send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
