//! # Per-CPU State
//!
//! One record per execution unit: which process it is running, the saved
//! context of its scheduler loop, and the interrupt-masking depth used by
//! [`Kernel::lock`](crate::Kernel::lock).
//!
//! Only the owning CPU touches its record, and only with interrupts
//! disabled, so plain relaxed atomics are enough.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::proc::Slot;

/// Sentinel for "no current process".
const IDLE: usize = usize::MAX;

pub struct Cpu<C> {
    /// Slot of the process running here, or [`IDLE`].
    current: AtomicUsize,
    /// Saved context of this CPU's scheduler loop. Written by
    /// `switch_context` when the loop switches to a process.
    pub(crate) scheduler: UnsafeCell<C>,
    /// Depth of `push_off` nesting.
    ncli: AtomicUsize,
    /// Were interrupts enabled before the outermost `push_off`?
    intena: AtomicBool,
}

// The cell is only accessed by the owning CPU with interrupts off.
unsafe impl<C: Send> Sync for Cpu<C> {}

impl<C: Default> Cpu<C> {
    pub fn new() -> Self {
        Self {
            current: AtomicUsize::new(IDLE),
            scheduler: UnsafeCell::new(C::default()),
            ncli: AtomicUsize::new(0),
            intena: AtomicBool::new(false),
        }
    }
}

impl<C> Cpu<C> {
    pub fn current(&self) -> Option<Slot> {
        match self.current.load(Ordering::Relaxed) {
            IDLE => None,
            index => Some(Slot::new(index)),
        }
    }

    pub(crate) fn set_current(&self, slot: Option<Slot>) {
        let raw = slot.map_or(IDLE, Slot::index);
        self.current.store(raw, Ordering::Relaxed);
    }

    pub fn ncli(&self) -> usize {
        self.ncli.load(Ordering::Relaxed)
    }

    pub(crate) fn set_ncli(&self, depth: usize) {
        self.ncli.store(depth, Ordering::Relaxed);
    }

    pub fn intena(&self) -> bool {
        self.intena.load(Ordering::Relaxed)
    }

    pub(crate) fn set_intena(&self, enabled: bool) {
        self.intena.store(enabled, Ordering::Relaxed);
    }
}

impl<C: Default> Default for Cpu<C> {
    fn default() -> Self {
        Self::new()
    }
}
