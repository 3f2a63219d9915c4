//! # Synchronization Primitives
//!
//! The scheduling lock. The process table is wrapped in a
//! `spin::Mutex` and handed out only as a [`TableGuard`], which also keeps
//! local interrupts masked for as long as it lives: a timer interrupt on
//! a CPU that holds the lock would otherwise spin on it forever.
//!
//! ```text
//!   Kernel::lock()                       TableGuard::drop()
//!     push_off()   ── ncli += 1            unlock spin mutex
//!     spin lock                            pop_off()  ── ncli -= 1,
//!                                                        restore IF at 0
//! ```
//!
//! A spin lock is required because the guard is held across
//! `switch_context`: the side that switches away parks its guard on its
//! own stack, and the side that resumes releases the guard it parked
//! earlier.

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

use spin::MutexGuard;

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::table::ProcTable;

/// Exclusive access to the process table and ready queues.
pub struct TableGuard<'a, P: Platform> {
    kernel: &'a Kernel<P>,
    guard: ManuallyDrop<MutexGuard<'a, ProcTable<P>>>,
}

impl<'a, P: Platform> TableGuard<'a, P> {
    /// Wrap a freshly taken spin guard. The caller has already done the
    /// matching `push_off`.
    pub(crate) fn new(kernel: &'a Kernel<P>, guard: MutexGuard<'a, ProcTable<P>>) -> Self {
        Self {
            kernel,
            guard: ManuallyDrop::new(guard),
        }
    }
}

impl<P: Platform> Deref for TableGuard<'_, P> {
    type Target = ProcTable<P>;

    fn deref(&self) -> &ProcTable<P> {
        &self.guard
    }
}

impl<P: Platform> DerefMut for TableGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut ProcTable<P> {
        &mut self.guard
    }
}

impl<P: Platform> Drop for TableGuard<'_, P> {
    fn drop(&mut self) {
        // Unlock strictly before interrupts may come back on.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.kernel.pop_off();
    }
}
