//! Page replacement policies for the buffer pool.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tern_common::page::FrameId;
use tern_common::{Result, TernError};

/// Classification of a page access.
///
/// Currently unweighted by the policy; carried so callers can annotate
/// scans and index probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    ///
    /// Fails when `frame_id` is outside the replacer's capacity.
    fn record_access(&self, frame_id: FrameId, access_type: AccessType) -> Result<()>;

    /// Marks a frame as evictable (unpinned) or non-evictable (pinned).
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction, dropping its access history.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Removes a frame and its history regardless of its eviction rank.
    ///
    /// Fails when the frame is tracked but not evictable.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Access history for one tracked frame.
struct LruKNode {
    /// Up to `k` access timestamps, oldest in front.
    history: VecDeque<u64>,
    /// Whether this frame may be chosen as a victim.
    evictable: bool,
}

impl LruKNode {
    fn new(k: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(k),
            evictable: false,
        }
    }

    fn record(&mut self, timestamp: u64, k: usize) {
        if self.history.len() == k {
            self.history.pop_front();
        }
        self.history.push_back(timestamp);
    }

    /// Eviction rank; the smallest rank is the best victim.
    ///
    /// Frames with fewer than `k` accesses have infinite backward
    /// K-distance and sort before any frame with a full history; among
    /// them the earliest most-recent access wins (classical LRU). Frames
    /// with full histories are ordered by their k-th most recent access,
    /// oldest first.
    fn rank(&self, k: usize) -> (u8, u64) {
        if self.history.len() < k {
            (0, self.history.back().copied().unwrap_or(0))
        } else {
            (1, self.history.front().copied().unwrap_or(0))
        }
    }
}

struct LruKInner {
    /// Tracked frames and their histories.
    nodes: HashMap<FrameId, LruKNode>,
    /// Logical clock, advanced once per recorded access.
    current_timestamp: u64,
    /// Number of evictable frames.
    curr_size: usize,
}

/// LRU-K replacement policy.
///
/// The backward K-distance of a frame is the time elapsed since its k-th
/// most recent access; frames with fewer than k recorded accesses have
/// infinite distance. [`Replacer::evict`] removes the evictable frame with
/// the largest distance.
///
/// Timestamps come from a logical counter advanced under the replacer's
/// mutex, so the access order is exactly the order in which
/// `record_access` acquires the lock.
pub struct LruKReplacer {
    /// Maximum number of tracked frames.
    num_frames: usize,
    /// The K in LRU-K.
    k: usize,
    /// Internal state behind one mutex.
    inner: Mutex<LruKInner>,
}

impl LruKReplacer {
    /// Creates a replacer tracking up to `num_frames` frames.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            num_frames,
            k,
            inner: Mutex::new(LruKInner {
                nodes: HashMap::with_capacity(num_frames),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Returns the configured K.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId, _access_type: AccessType) -> Result<()> {
        if frame_id.index() >= self.num_frames {
            return Err(TernError::FrameOutOfRange {
                frame_id,
                capacity: self.num_frames,
            });
        }

        let mut inner = self.inner.lock();
        let timestamp = inner.current_timestamp;
        inner.current_timestamp += 1;

        let k = self.k;
        inner
            .nodes
            .entry(frame_id)
            .or_insert_with(|| LruKNode::new(k))
            .record(timestamp, k);
        Ok(())
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes.get_mut(&frame_id) else {
            return;
        };
        if node.evictable == evictable {
            return;
        }
        node.evictable = evictable;
        if evictable {
            inner.curr_size += 1;
        } else {
            inner.curr_size -= 1;
        }
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.curr_size == 0 {
            return None;
        }

        // Linear scan; timestamps are unique so the minimum rank is too.
        let victim = inner
            .nodes
            .iter()
            .filter(|(_, node)| node.evictable)
            .min_by_key(|(_, node)| node.rank(self.k))
            .map(|(&frame_id, _)| frame_id)?;

        inner.nodes.remove(&victim);
        inner.curr_size -= 1;
        Some(victim)
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.nodes.get(&frame_id) {
            None => Ok(()),
            Some(node) if !node.evictable => Err(TernError::FrameNotEvictable { frame_id }),
            Some(_) => {
                inner.nodes.remove(&frame_id);
                inner.curr_size -= 1;
                Ok(())
            }
        }
    }

    fn size(&self) -> usize {
        self.inner.lock().curr_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(replacer: &LruKReplacer, frame_id: u32) {
        replacer
            .record_access(FrameId(frame_id), AccessType::Unknown)
            .unwrap();
    }

    #[test]
    fn test_lru_k_new() {
        let replacer = LruKReplacer::new(10, 2);
        assert_eq!(replacer.capacity(), 10);
        assert_eq!(replacer.k(), 2);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_evict_empty() {
        let replacer = LruKReplacer::new(10, 2);
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_lru_k_record_does_not_change_size() {
        let replacer = LruKReplacer::new(10, 2);
        record(&replacer, 0);
        record(&replacer, 1);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_out_of_range_access() {
        let replacer = LruKReplacer::new(5, 2);
        let result = replacer.record_access(FrameId(5), AccessType::Unknown);
        assert!(matches!(result, Err(TernError::FrameOutOfRange { .. })));
        assert!(replacer
            .record_access(FrameId(4), AccessType::Unknown)
            .is_ok());
    }

    #[test]
    fn test_lru_k_set_evictable_unknown_is_noop() {
        let replacer = LruKReplacer::new(5, 2);
        replacer.set_evictable(FrameId(3), true);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_set_evictable_counts_transitions_once() {
        let replacer = LruKReplacer::new(5, 2);
        record(&replacer, 0);

        replacer.set_evictable(FrameId(0), true);
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId(0), false);
        replacer.set_evictable(FrameId(0), false);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_infinite_distance_uses_classical_lru() {
        // Frames with fewer than k accesses all have infinite backward
        // K-distance; among them the least recently used goes first. A
        // refreshed frame with a full history is evicted after every
        // infinite-distance frame.
        let replacer = LruKReplacer::new(7, 2);

        for frame_id in 1..=4 {
            record(&replacer, frame_id);
        }
        for frame_id in 1..=4 {
            replacer.set_evictable(FrameId(frame_id), true);
        }
        record(&replacer, 1); // now two accesses: finite distance

        assert_eq!(replacer.evict(), Some(FrameId(2)));
        assert_eq!(replacer.evict(), Some(FrameId(3)));
        assert_eq!(replacer.evict(), Some(FrameId(4)));

        // New single-access frames still outrank the refreshed frame 1.
        record(&replacer, 5);
        record(&replacer, 6);
        replacer.set_evictable(FrameId(5), true);
        replacer.set_evictable(FrameId(6), true);

        assert_eq!(replacer.evict(), Some(FrameId(5)));
        assert_eq!(replacer.evict(), Some(FrameId(6)));
        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_distance_orders_full_histories() {
        // All frames have k accesses; the one whose k-th most recent
        // access is oldest has the largest distance and goes first.
        let replacer = LruKReplacer::new(3, 2);

        record(&replacer, 1);
        record(&replacer, 1);
        record(&replacer, 2);
        record(&replacer, 2);
        record(&replacer, 3);
        record(&replacer, 3);
        for frame_id in 1..=3 {
            replacer.set_evictable(FrameId(frame_id), true);
        }

        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
        assert_eq!(replacer.evict(), Some(FrameId(3)));
    }

    #[test]
    fn test_lru_k_history_truncated_to_k() {
        // Only the last k accesses matter: a burst of old accesses on
        // frame 1 must not outweigh frame 2's older k-th-last access.
        let replacer = LruKReplacer::new(4, 2);

        for _ in 0..5 {
            record(&replacer, 1); // timestamps 0..4, history keeps [3, 4]
        }
        record(&replacer, 2); // 5
        record(&replacer, 2); // 6, history [5, 6]
        replacer.set_evictable(FrameId(1), true);
        replacer.set_evictable(FrameId(2), true);

        // Frame 1's k-th-last access (3) is older than frame 2's (5).
        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
    }

    #[test]
    fn test_lru_k_non_evictable_never_chosen() {
        let replacer = LruKReplacer::new(10, 2);

        for _ in 0..10 {
            record(&replacer, 7);
        }
        assert!(replacer.evict().is_none());
        assert_eq!(replacer.size(), 0);

        record(&replacer, 3);
        replacer.set_evictable(FrameId(3), true);
        assert_eq!(replacer.evict(), Some(FrameId(3)));
        // Frame 7 is still pinned.
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_lru_k_remove_non_evictable_fails() {
        let replacer = LruKReplacer::new(5, 2);

        record(&replacer, 0);
        let result = replacer.remove(FrameId(0));
        assert!(matches!(result, Err(TernError::FrameNotEvictable { .. })));
    }

    #[test]
    fn test_lru_k_remove_unknown_is_noop() {
        let replacer = LruKReplacer::new(5, 2);
        assert!(replacer.remove(FrameId(4)).is_ok());
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_remove_evictable() {
        let replacer = LruKReplacer::new(5, 2);

        record(&replacer, 0);
        record(&replacer, 1);
        replacer.set_evictable(FrameId(0), true);
        replacer.set_evictable(FrameId(1), true);
        assert_eq!(replacer.size(), 2);

        replacer.remove(FrameId(0)).unwrap();
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId(1)));
    }

    #[test]
    fn test_lru_k_remove_resets_history() {
        let replacer = LruKReplacer::new(5, 2);

        record(&replacer, 0);
        record(&replacer, 0); // full history: finite distance
        record(&replacer, 1);
        record(&replacer, 1);
        replacer.set_evictable(FrameId(0), true);
        replacer.set_evictable(FrameId(1), true);

        replacer.remove(FrameId(0)).unwrap();
        record(&replacer, 0); // brand new: single access, infinite distance
        replacer.set_evictable(FrameId(0), true);

        // Despite its older first sighting, frame 0 now ranks infinite and
        // is evicted before frame 1.
        assert_eq!(replacer.evict(), Some(FrameId(0)));
        assert_eq!(replacer.evict(), Some(FrameId(1)));
    }

    #[test]
    fn test_lru_k_evict_decrements_size() {
        let replacer = LruKReplacer::new(5, 3);

        for frame_id in 0..4 {
            record(&replacer, frame_id);
            replacer.set_evictable(FrameId(frame_id), true);
        }
        assert_eq!(replacer.size(), 4);

        replacer.evict().unwrap();
        assert_eq!(replacer.size(), 3);
        replacer.evict().unwrap();
        replacer.evict().unwrap();
        replacer.evict().unwrap();
        assert_eq!(replacer.size(), 0);
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_lru_k_pin_unpin_cycle() {
        let replacer = LruKReplacer::new(3, 2);

        for frame_id in 0..3 {
            record(&replacer, frame_id);
            replacer.set_evictable(FrameId(frame_id), true);
        }

        // Pin frame 0; it must be skipped.
        replacer.set_evictable(FrameId(0), false);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict(), Some(FrameId(1)));

        // Unpin and it becomes a candidate again.
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.evict(), Some(FrameId(0)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
    }

    #[test]
    fn test_lru_k_with_k_one_is_plain_lru() {
        let replacer = LruKReplacer::new(4, 1);

        for frame_id in 0..3 {
            record(&replacer, frame_id);
            replacer.set_evictable(FrameId(frame_id), true);
        }
        record(&replacer, 0); // refresh

        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }
}
