//! # Process Lifecycle
//!
//! Creation, termination, reaping and blocking, seen from the process that
//! asks for them. The state changes themselves live in
//! [`ProcTable`](crate::table::ProcTable); this layer adds the platform
//! calls (stacks, address spaces, files) and the control transfers.
//!
//! Platform resources are released outside the scheduling lock whenever
//! the ownership rules allow it: a zombie's stack and address space are
//! freed by the parent after reaping, and an exiting process closes its
//! files before it takes the lock.

use log::{debug, info};

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::proc::{Channel, Pid, ProcName, Slot};
use crate::sync::TableGuard;
use crate::table::Reap;
use crate::Kernel;

impl<P: Platform> Kernel<P> {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Claim a slot and give it a kernel stack whose first dispatch lands
    /// in [`fork_return`](Kernel::fork_return).
    fn allocate(&self) -> Result<Slot> {
        let mut table = self.lock();
        let slot = table.claim()?;
        let Some(mut kstack) = self.platform().alloc_kernel_stack() else {
            table.release_embryo(slot);
            return Err(Error::OutOfMemory);
        };
        let context = self.platform().prepare_first_dispatch(&mut kstack);
        let p = table.proc_mut(slot);
        p.context = context;
        p.kstack = Some(kstack);
        Ok(slot)
    }

    /// Roll an embryo back to `Unused` and free its stack.
    fn discard(&self, slot: Slot) {
        let kstack = self.lock().release_embryo(slot);
        if let Some(kstack) = kstack {
            self.platform().free_kernel_stack(kstack);
        }
    }

    /// Create the bootstrap process from the built-in init image. Every
    /// other process descends from it, and orphans are handed to it.
    ///
    /// Calling this a second time is a fatal error.
    pub fn create_first_process(&self) -> Result<Pid> {
        if self.lock().init().is_some() {
            panic!("create_first_process: bootstrap process already exists");
        }

        let slot = self.allocate()?;
        let (space, size) = match self.platform().create_address_space() {
            Ok(created) => created,
            Err(err) => {
                self.discard(slot);
                return Err(err);
            }
        };
        let files = self.platform().root_files();

        let mut table = self.lock();
        let p = table.proc_mut(slot);
        if let Some(kstack) = p.kstack.as_mut() {
            self.platform().prepare_user_entry(kstack);
        }
        p.space = Some(space);
        p.size = size;
        p.files = Some(files);
        p.name = ProcName::new("initcode");
        p.parent = None;
        let pid = p.pid;
        table.init = Some(slot);
        table.make_runnable(slot);
        info!("bootstrap process pid {} created", pid);
        Ok(pid)
    }

    /// Duplicate the calling process. Returns the child's pid to the
    /// parent; the child resumes from the same trap frame with 0.
    ///
    /// Fails without leaving a trace if no slot, stack or address space is
    /// available.
    pub fn fork(&self) -> Result<Pid> {
        let parent = self.current();
        let child = self.allocate()?;

        let mut table = self.lock();
        let (pp, cp) = table.pair_mut(parent, child);
        let space = match pp.space.as_ref() {
            Some(space) => self.platform().duplicate_address_space(space, pp.size),
            None => Err(Error::OutOfMemory),
        };
        let space = match space {
            Ok(space) => space,
            Err(err) => {
                let kstack = table.release_embryo(child);
                drop(table);
                if let Some(kstack) = kstack {
                    self.platform().free_kernel_stack(kstack);
                }
                return Err(err);
            }
        };

        if let (Some(from), Some(to)) = (pp.kstack.as_ref(), cp.kstack.as_mut()) {
            self.platform().copy_trap_frame(from, to);
        }
        cp.files = pp.files.as_ref().map(|f| self.platform().duplicate_files(f));
        cp.space = Some(space);
        cp.size = pp.size;
        cp.name = pp.name;
        cp.parent = Some(parent);
        let (parent_pid, pid) = (pp.pid, cp.pid);
        table.make_runnable(child);
        debug!("pid {} forked pid {}", parent_pid, pid);
        Ok(pid)
    }

    // -----------------------------------------------------------------------
    // Termination
    // -----------------------------------------------------------------------

    /// Terminate the calling process. It stays a zombie until its parent
    /// reaps it. The bootstrap process must never exit.
    pub fn exit(&self) -> ! {
        let slot = self.current();
        let files = {
            let mut table = self.lock();
            if table.init() == Some(slot) {
                panic!("init exiting");
            }
            table.proc_mut(slot).files.take()
        };
        if let Some(files) = files {
            self.platform().release_files(files);
        }

        let mut table = self.lock();
        table.exit_slot(slot);
        let _ = self.sched(table);
        panic!("zombie exit");
    }

    /// Wait for a child to exit and reap it. Returns its pid.
    ///
    /// `Err(NoChildren)` if the caller has none, `Err(Killed)` if it was
    /// killed while waiting.
    pub fn wait(&self) -> Result<Pid> {
        let slot = self.current();
        let mut table = self.lock();
        loop {
            match table.reap_child(slot) {
                Reap::Reaped { pid, kstack, space } => {
                    drop(table);
                    if let Some(kstack) = kstack {
                        self.platform().free_kernel_stack(kstack);
                    }
                    if let Some(space) = space {
                        self.platform().destroy_address_space(space);
                    }
                    return Ok(pid);
                }
                Reap::NoChildren => return Err(Error::NoChildren),
                Reap::Pending => {
                    if table.proc(slot).killed {
                        return Err(Error::Killed);
                    }
                    table = self.sleep_locked(Channel::Proc(slot), table);
                }
            }
        }
    }

    /// Flag `pid` for termination. A sleeping target is woken so it can
    /// notice; it exits at its next kill-check point.
    pub fn kill(&self, pid: Pid) -> Result<()> {
        self.lock().kill(pid)?;
        info!("pid {} killed", pid);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sleep / wakeup
    // -----------------------------------------------------------------------

    /// Sleep on `chan` while holding the scheduling lock itself. Returns
    /// with the lock held again after a wakeup.
    pub fn sleep_locked<'a>(
        &'a self,
        chan: Channel,
        mut table: TableGuard<'a, P>,
    ) -> TableGuard<'a, P> {
        let slot = self.current();
        table.sleep_on(slot, chan);
        let mut table = self.sched(table);
        table.proc_mut(slot).chan = None;
        table
    }

    /// Atomically release `guard` and sleep on `chan`; reacquire `lock`
    /// before returning.
    ///
    /// The scheduling lock is taken before `guard` is dropped, so a
    /// `wakeup` issued by whoever takes `lock` next cannot be missed.
    pub fn sleep<'m, T>(
        &self,
        chan: Channel,
        lock: &'m spin::Mutex<T>,
        guard: spin::MutexGuard<'m, T>,
    ) -> spin::MutexGuard<'m, T> {
        let table = self.lock();
        drop(guard);
        drop(self.sleep_locked(chan, table));
        lock.lock()
    }

    /// Wake every process sleeping on `chan`.
    pub fn wakeup(&self, chan: Channel) {
        self.lock().wakeup(chan);
    }

    /// Sleep for `n` ticks. `Err(Killed)` if killed meanwhile.
    pub fn sleep_ticks(&self, n: u64) -> Result<()> {
        let slot = self.current();
        let mut table = self.lock();
        let start = table.ticks();
        while table.ticks() - start < n {
            if table.proc(slot).killed {
                return Err(Error::Killed);
            }
            table = self.sleep_locked(Channel::Ticks, table);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    /// Grow (or shrink, for negative `delta`) the calling process's address
    /// space. Returns the previous size.
    pub fn grow(&self, delta: isize) -> Result<usize> {
        let slot = self.current();
        let mut table = self.lock();
        let p = table.proc_mut(slot);
        let old = p.size;
        let new = if delta >= 0 {
            old.checked_add(delta.unsigned_abs())
        } else {
            old.checked_sub(delta.unsigned_abs())
        }
        .ok_or(Error::OutOfMemory)?;

        let space = p.space.as_mut().ok_or(Error::OutOfMemory)?;
        p.size = self.platform().resize_address_space(space, old, new)?;
        self.platform().switch_to(Some(&*space));
        Ok(old)
    }
}
