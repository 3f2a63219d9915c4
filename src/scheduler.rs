//! # Scheduler
//!
//! The per-CPU scheduler loop and the process side of the context switch.
//!
//! ## Scheduling Algorithm
//!
//! Each CPU runs [`Kernel::scheduler`] forever. One iteration:
//! 1. **Unmask interrupts** so a CPU with nothing to do still takes ticks
//! 2. **Lock** the process table
//! 3. **Select** with strict priority over the ready queues; the chosen
//!    process is checked out of its level and marked `Running`
//! 4. **Switch** to its address space and context. The loop is suspended
//!    until the process calls [`sched`](Kernel::sched)
//! 5. **Re-admit**: a process that came back `Runnable` goes to the tail of
//!    its current level; one that slept or exited stays out
//! 6. **Unlock**, or idle if nothing was runnable
//!
//! ## Lock hand-over
//!
//! ```text
//!   scheduler loop                     process
//!   ──────────────                     ───────
//!   lock() ─── guard A parked
//!   switch_context ─────────────────►  fork_return(): force unlock A
//!                                       ...
//!                                      lock() ─── guard B parked
//!                   ◄───────────────── sched(): switch_context
//!   drop(guard A): unlocks B's hold
//!   lock() ─── guard C parked
//!   switch_context ─────────────────►  sched() returns guard B
//!                                      drop(guard B): unlocks C's hold
//! ```
//!
//! Quantum accounting is done by the timer path alone; re-admission only
//! checks that nobody left a process with an exhausted quantum.

use log::trace;

use crate::platform::Platform;
use crate::proc::{Pid, ProcState};
use crate::sync::TableGuard;
use crate::Kernel;

impl<P: Platform> Kernel<P> {
    /// Per-CPU scheduler loop. Never returns.
    pub fn scheduler(&self) -> ! {
        loop {
            self.schedule_once();
        }
    }

    /// One iteration of the scheduler loop. Returns the pid that was run,
    /// or `None` if nothing was runnable (after idling).
    pub fn schedule_once(&self) -> Option<Pid> {
        self.platform().enable_interrupts();

        let mut table = self.lock();
        let Some(slot) = table.dispatch() else {
            drop(table);
            self.platform().idle();
            return None;
        };

        let cpu = self.cpu();
        cpu.set_current(Some(slot));
        let p = table.proc(slot);
        let pid = p.pid;
        self.platform().switch_to(p.space.as_ref());

        let resume: *const P::Context = &p.context;
        unsafe { self.platform().switch_context(cpu.scheduler.get(), resume) };

        // Back from the process with the lock held on its behalf.
        self.platform().switch_to(None);
        table.readmit(slot);
        self.cpu().set_current(None);
        trace!("pid {} left cpu as {}", pid, table.proc(slot).state);
        Some(pid)
    }

    /// Give the CPU back to the scheduler loop. The caller holds the
    /// scheduling lock (and nothing else) and has already moved the current
    /// process out of `Running`. Returns once the process is dispatched
    /// again, with the lock held.
    pub(crate) fn sched<'a>(&'a self, mut table: TableGuard<'a, P>) -> TableGuard<'a, P> {
        if self.platform().interrupts_enabled() {
            panic!("sched interruptible");
        }
        let cpu = self.cpu();
        let Some(slot) = cpu.current() else {
            panic!("sched: no current process");
        };
        if cpu.ncli() != 1 {
            panic!("sched locks");
        }
        if table.proc(slot).state == ProcState::Running {
            panic!("sched running");
        }

        let intena = cpu.intena();
        let save: *mut P::Context = &mut table.proc_mut(slot).context;
        unsafe { self.platform().switch_context(save, cpu.scheduler.get()) };

        // Possibly on another CPU now.
        self.cpu().set_intena(intena);
        table
    }

    /// Relinquish the CPU for one scheduling round. The process stays at
    /// its level and keeps the ticks it has used.
    pub fn yield_now(&self) {
        let slot = self.current();
        let mut table = self.lock();
        table.yield_slot(slot);
        drop(self.sched(table));
    }
}
