//! # Ready-Queue Set
//!
//! The multi-level feedback queue store: `NLEVELS` bounded FIFOs of
//! process handles, level 0 first.
//!
//! ## Invariants
//!
//! - A handle appears at most once across the whole set.
//! - Within a level, insertion order is dispatch order.
//! - The set is only touched under the scheduling lock; it lives inside the
//!   [`ProcTable`](crate::table::ProcTable) for that reason.
//!
//! A full level drops the insertion with a warning instead of halting:
//! `QUEUE_CAPACITY >= NPROC` is checked at compile time, so it can only
//! happen with a misconfigured capacity.

use log::{trace, warn};

use crate::config::{NLEVELS, QUEUE_CAPACITY};
use crate::proc::Slot;

// ---------------------------------------------------------------------------
// Single level
// ---------------------------------------------------------------------------

/// Bounded circular FIFO of process handles.
#[derive(Debug, Clone, Copy)]
pub struct RunQueue<const CAP: usize> {
    slots: [Option<Slot>; CAP],
    head: usize,
    len: usize,
}

impl<const CAP: usize> RunQueue<CAP> {
    pub const EMPTY: Self = Self {
        slots: [None; CAP],
        head: 0,
        len: 0,
    };

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == CAP
    }

    /// Handles in FIFO order, head first.
    pub fn iter(&self) -> impl Iterator<Item = Slot> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % CAP])
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.iter().any(|s| s == slot)
    }

    /// Append at the tail. Returns `false` if the queue is full.
    fn push_back(&mut self, slot: Slot) -> bool {
        if self.is_full() {
            return false;
        }
        self.slots[(self.head + self.len) % CAP] = Some(slot);
        self.len += 1;
        true
    }

    fn pop_front(&mut self) -> Option<Slot> {
        if self.is_empty() {
            return None;
        }
        let slot = self.slots[self.head].take();
        self.head = (self.head + 1) % CAP;
        self.len -= 1;
        slot
    }

    /// Rebuild the queue without `slot`, keeping the others in order.
    fn remove(&mut self, slot: Slot) -> bool {
        if !self.contains(slot) {
            return false;
        }
        let old = core::mem::replace(self, Self::EMPTY);
        for s in old.iter().filter(|&s| s != slot) {
            self.push_back(s);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Queue set
// ---------------------------------------------------------------------------

/// The full MLFQ store: one [`RunQueue`] per priority level.
#[derive(Debug)]
pub struct ReadyQueues<const CAP: usize = QUEUE_CAPACITY> {
    levels: [RunQueue<CAP>; NLEVELS],
}

impl<const CAP: usize> ReadyQueues<CAP> {
    pub const fn new() -> Self {
        Self {
            levels: [RunQueue::EMPTY; NLEVELS],
        }
    }

    /// The FIFO of `level`, clamped to the lowest level.
    pub fn level(&self, level: usize) -> &RunQueue<CAP> {
        &self.levels[level.min(NLEVELS - 1)]
    }

    /// Insert `slot` at the tail of `level` (clamped to the valid range).
    ///
    /// Already present in that level: no-op. Level full: dropped with a
    /// warning. Returns whether the handle was inserted.
    pub fn enqueue(&mut self, level: usize, slot: Slot) -> bool {
        let level = level.min(NLEVELS - 1);
        let queue = &mut self.levels[level];
        if queue.contains(slot) {
            return false;
        }
        if !queue.push_back(slot) {
            warn!("ready queue level {} full, dropping slot {}", level, slot.index());
            return false;
        }
        true
    }

    /// Pop from the head of `level` until a runnable handle turns up; that
    /// one is rotated to the tail and returned. Non-runnable handles are
    /// stale and get discarded on the way.
    pub fn pick_round_robin<F>(&mut self, level: usize, is_runnable: F) -> Option<Slot>
    where
        F: Fn(Slot) -> bool,
    {
        let queue = &mut self.levels[level.min(NLEVELS - 1)];
        while let Some(slot) = queue.pop_front() {
            if is_runnable(slot) {
                queue.push_back(slot);
                return Some(slot);
            }
            trace!("discarding stale slot {} from level {}", slot.index(), level);
        }
        None
    }

    /// Strict priority: the first level with a runnable handle wins.
    pub fn pick_next<F>(&mut self, is_runnable: F) -> Option<Slot>
    where
        F: Fn(Slot) -> bool,
    {
        (0..NLEVELS).find_map(|level| self.pick_round_robin(level, &is_runnable))
    }

    /// Drop `slot` from every level it appears in. No-op if absent.
    pub fn remove(&mut self, slot: Slot) {
        for queue in self.levels.iter_mut() {
            queue.remove(slot);
        }
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.levels.iter().any(|q| q.contains(slot))
    }

    /// Level currently holding `slot`, if any.
    pub fn level_of(&self, slot: Slot) -> Option<usize> {
        self.levels.iter().position(|q| q.contains(slot))
    }

    /// Number of times `slot` appears across all levels. Anything above 1
    /// is a broken invariant; used by tests and debug checks.
    pub fn occurrences(&self, slot: Slot) -> usize {
        self.levels
            .iter()
            .map(|q| q.iter().filter(|&s| s == slot).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|q| q.is_empty())
    }
}

impl<const CAP: usize> Default for ReadyQueues<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(i: usize) -> Slot {
        Slot::new(i)
    }

    fn all_runnable(_: Slot) -> bool {
        true
    }

    #[test]
    fn test_enqueue_is_fifo_and_idempotent() {
        let mut q: ReadyQueues = ReadyQueues::new();
        assert!(q.enqueue(0, s(1)));
        assert!(q.enqueue(0, s(2)));
        assert!(!q.enqueue(0, s(1)));
        assert_eq!(q.level(0).iter().collect::<Vec<_>>(), [s(1), s(2)]);
    }

    #[test]
    fn test_out_of_range_level_is_clamped() {
        let mut q: ReadyQueues = ReadyQueues::new();
        q.enqueue(NLEVELS + 5, s(3));
        assert_eq!(q.level_of(s(3)), Some(NLEVELS - 1));
    }

    #[test]
    fn test_full_level_drops_silently() {
        let mut q: ReadyQueues<2> = ReadyQueues::new();
        assert!(q.enqueue(1, s(0)));
        assert!(q.enqueue(1, s(1)));
        assert!(!q.enqueue(1, s(2)));
        assert_eq!(q.level(1).len(), 2);
        assert!(!q.contains(s(2)));
    }

    #[test]
    fn test_round_robin_rotation() {
        let mut q: ReadyQueues = ReadyQueues::new();
        for i in 0..3 {
            q.enqueue(0, s(i));
        }
        let picks: Vec<_> = (0..7).map(|_| q.pick_next(all_runnable).unwrap()).collect();
        assert_eq!(picks, [s(0), s(1), s(2), s(0), s(1), s(2), s(0)]);
    }

    #[test]
    fn test_strict_priority_across_levels() {
        let mut q: ReadyQueues = ReadyQueues::new();
        q.enqueue(2, s(9));
        q.enqueue(1, s(5));
        assert_eq!(q.pick_next(all_runnable), Some(s(5)));
        q.enqueue(0, s(1));
        assert_eq!(q.pick_next(all_runnable), Some(s(1)));
        q.remove(s(1));
        q.remove(s(5));
        assert_eq!(q.pick_next(all_runnable), Some(s(9)));
    }

    #[test]
    fn test_stale_entries_are_discarded() {
        let mut q: ReadyQueues = ReadyQueues::new();
        q.enqueue(0, s(1));
        q.enqueue(0, s(2));
        q.enqueue(0, s(3));
        let picked = q.pick_next(|slot| slot != s(1) && slot != s(2));
        assert_eq!(picked, Some(s(3)));
        assert!(!q.contains(s(1)));
        assert!(!q.contains(s(2)));
        assert_eq!(q.pick_next(|_| false), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_preserves_order_and_tolerates_absence() {
        let mut q: ReadyQueues = ReadyQueues::new();
        for i in 0..4 {
            q.enqueue(1, s(i));
        }
        // Wrap the ring so the rebuild has to unroll it.
        q.pick_round_robin(1, all_runnable);
        q.remove(s(2));
        q.remove(s(42));
        assert_eq!(q.level(1).iter().collect::<Vec<_>>(), [s(1), s(3), s(0)]);
    }

    #[test]
    fn test_no_duplicates_under_mixed_operations() {
        let mut q: ReadyQueues<8> = ReadyQueues::new();
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..2_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let slot = s((seed >> 8) as usize % 10);
            let level = (seed >> 20) as usize % (NLEVELS + 1);
            match (seed >> 28) % 4 {
                // Callers move a handle between levels by removing it first.
                0 | 1 => {
                    q.remove(slot);
                    q.enqueue(level, slot);
                }
                2 => q.remove(slot),
                _ => {
                    q.pick_round_robin(level, |x| x.index() % 3 != 0);
                }
            }
            for i in 0..10 {
                assert!(q.occurrences(s(i)) <= 1, "slot {} duplicated", i);
            }
        }
    }
}
