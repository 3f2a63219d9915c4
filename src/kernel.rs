//! # Kernel
//!
//! The top-level handle tying the pieces together: the platform, the
//! lock-protected process table and the per-CPU records.
//!
//! The operations themselves are spread over sibling modules as further
//! `impl Kernel` blocks:
//!
//! | Module        | Operations                                            |
//! |---------------|-------------------------------------------------------|
//! | `scheduler`   | `scheduler`, `schedule_once`, `yield_now`             |
//! | `lifecycle`   | `create_first_process`, `fork`, `exit`, `wait`, ...   |
//! | `trap`        | `trap`, `syscall`                                     |
//!
//! ## Startup Sequence
//!
//! ```text
//! boot CPU
//!   ├─► Kernel::new(platform)          ← usually stored in a static
//!   ├─► kernel.create_first_process()  ← bootstrap process, Runnable
//!   └─► kernel.scheduler()             ← every CPU, never returns
//!         └─► first dispatch lands in Kernel::fork_return()
//! ```

use log::info;

use crate::config::NCPU;
use crate::cpu::Cpu;
use crate::platform::Platform;
use crate::proc::{Pid, ProcInfo, Slot};
use crate::sync::TableGuard;
use crate::table::ProcTable;

pub struct Kernel<P: Platform> {
    platform: P,
    table: spin::Mutex<ProcTable<P>>,
    cpus: [Cpu<P::Context>; NCPU],
}

impl<P: Platform> Kernel<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            table: spin::Mutex::new(ProcTable::new()),
            cpus: core::array::from_fn(|_| Cpu::new()),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    // -----------------------------------------------------------------------
    // Scheduling lock
    // -----------------------------------------------------------------------

    /// Take the scheduling lock with local interrupts masked.
    pub fn lock(&self) -> TableGuard<'_, P> {
        self.push_off();
        TableGuard::new(self, self.table.lock())
    }

    /// Mask interrupts on this CPU. Nests; the first call remembers whether
    /// interrupts were on.
    pub fn push_off(&self) {
        let enabled = self.platform.interrupts_enabled();
        self.platform.disable_interrupts();
        let cpu = self.cpu();
        if cpu.ncli() == 0 {
            cpu.set_intena(enabled);
        }
        cpu.set_ncli(cpu.ncli() + 1);
    }

    /// Undo one [`push_off`](Self::push_off). Interrupts come back on only
    /// when the outermost level is popped and they were on before it.
    pub fn pop_off(&self) {
        if self.platform.interrupts_enabled() {
            panic!("pop_off: interruptible");
        }
        let cpu = self.cpu();
        let depth = cpu.ncli();
        if depth == 0 {
            panic!("pop_off: unbalanced");
        }
        cpu.set_ncli(depth - 1);
        if depth == 1 && cpu.intena() {
            self.platform.enable_interrupts();
        }
    }

    /// First code a new process runs, reached from the context built by
    /// [`prepare_first_dispatch`](crate::platform::ContextSwitch::prepare_first_dispatch).
    /// Releases the scheduling lock taken by the scheduler loop that
    /// dispatched it; the platform then returns to user mode.
    ///
    /// # Safety
    /// Only valid as the very first thing run on a freshly dispatched
    /// process's kernel stack, with the scheduling lock held by this CPU.
    pub unsafe fn fork_return(&self) {
        self.table.force_unlock();
        self.pop_off();
    }

    // -----------------------------------------------------------------------
    // Per-CPU state
    // -----------------------------------------------------------------------

    /// The record of the executing CPU. Interrupts must be off so the
    /// caller cannot migrate between reading the id and using the record.
    pub(crate) fn cpu(&self) -> &Cpu<P::Context> {
        if self.platform.interrupts_enabled() {
            panic!("cpu() called with interrupts enabled");
        }
        let id = self.platform.cpu_id();
        match self.cpus.get(id) {
            Some(cpu) => cpu,
            None => panic!("unknown cpu id {}", id),
        }
    }

    /// Slot of the process running on this CPU, if any.
    pub(crate) fn current_slot(&self) -> Option<Slot> {
        self.push_off();
        let slot = self.cpu().current();
        self.pop_off();
        slot
    }

    /// Slot of the calling process. Process-context operations only.
    pub(crate) fn current(&self) -> Slot {
        match self.current_slot() {
            Some(slot) => slot,
            None => panic!("no current process"),
        }
    }

    /// Pid of the calling process, if a process is running here.
    pub fn current_pid(&self) -> Option<Pid> {
        let slot = self.current_slot()?;
        Some(self.lock().proc(slot).pid)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Ticks since boot.
    pub fn uptime(&self) -> u64 {
        self.lock().ticks()
    }

    /// Visit a consistent snapshot of every live process.
    pub fn snapshot<F>(&self, mut visit: F)
    where
        F: FnMut(ProcInfo),
    {
        let table = self.lock();
        for (_, p) in table.live() {
            visit(p.info());
        }
    }

    pub fn process_info(&self, pid: Pid) -> Option<ProcInfo> {
        let table = self.lock();
        let slot = table.find(pid)?;
        Some(table.proc(slot).info())
    }

    /// Log one line per live process.
    pub fn procdump(&self) {
        self.snapshot(|info| info!("{}", info));
    }
}
