//! # Process Table
//!
//! The single aggregate guarded by the scheduling lock: every PCB, the
//! ready-queue set, the global tick counter and the bootstrap-process
//! handle. All process state transitions are methods here, so holding a
//! [`TableGuard`](crate::sync::TableGuard) is the only way to perform one.
//!
//! This layer never switches contexts and never calls the platform; the
//! [`Kernel`](crate::Kernel) wraps it with the control transfers.
//!
//! ## Queue discipline
//!
//! `state == Runnable` if and only if the slot sits in exactly one ready
//! queue level. Every transition out of `Runnable` removes the handle;
//! every transition into it enqueues at the current priority.

use log::{debug, trace};

use crate::config::{quantum, BOOST_INTERVAL, NLEVELS, NPROC};
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::proc::{Channel, Pid, Proc, ProcName, ProcState, Slot};
use crate::queue::ReadyQueues;

/// Outcome of looking for a child to reap.
pub enum Reap<P: Platform> {
    /// A zombie child was released. Its kernel stack and address space are
    /// handed back for the caller to free outside the lock.
    Reaped {
        pid: Pid,
        kstack: Option<P::KernelStack>,
        space: Option<P::AddressSpace>,
    },
    /// Children exist but none has exited yet.
    Pending,
    NoChildren,
}

pub struct ProcTable<P: Platform> {
    pub(crate) procs: [Proc<P>; NPROC],
    pub(crate) queues: ReadyQueues,
    /// The bootstrap process; orphans are reparented to it.
    pub(crate) init: Option<Slot>,
    /// Global tick counter, advanced by the timekeeper CPU.
    pub(crate) ticks: u64,
    next_pid: u32,
}

impl<P: Platform> ProcTable<P> {
    pub fn new() -> Self {
        Self {
            procs: core::array::from_fn(|_| Proc::new()),
            queues: ReadyQueues::new(),
            init: None,
            ticks: 0,
            next_pid: 1,
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[inline]
    pub fn proc(&self, slot: Slot) -> &Proc<P> {
        &self.procs[slot.index()]
    }

    #[inline]
    pub fn proc_mut(&mut self, slot: Slot) -> &mut Proc<P> {
        &mut self.procs[slot.index()]
    }

    pub fn queues(&self) -> &ReadyQueues {
        &self.queues
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn init(&self) -> Option<Slot> {
        self.init
    }

    /// Slot of the live process with `pid`.
    pub fn find(&self, pid: Pid) -> Option<Slot> {
        self.live().find(|(_, p)| p.pid == pid).map(|(slot, _)| slot)
    }

    /// Every live slot, in table order.
    pub fn live(&self) -> impl Iterator<Item = (Slot, &Proc<P>)> + '_ {
        self.procs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_live())
            .map(|(i, p)| (Slot::new(i), p))
    }

    /// Two distinct PCBs borrowed mutably at once.
    pub(crate) fn pair_mut(&mut self, a: Slot, b: Slot) -> (&mut Proc<P>, &mut Proc<P>) {
        let (a, b) = (a.index(), b.index());
        assert_ne!(a, b, "pair_mut: same slot");
        if a < b {
            let (lo, hi) = self.procs.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.procs.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// `Unused → Embryo`: claim a free slot and give it a fresh pid at the
    /// top priority level.
    pub fn claim(&mut self) -> Result<Slot> {
        let index = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Unused)
            .ok_or(Error::NoFreeSlot)?;

        let pid = Pid(self.next_pid);
        self.next_pid += 1;

        let p = &mut self.procs[index];
        p.state = ProcState::Embryo;
        p.pid = pid;
        p.priority = 0;
        p.ticks = 0;
        p.killed = false;
        p.chan = None;
        trace!("claimed slot {} for pid {}", index, pid);
        Ok(Slot::new(index))
    }

    /// Roll an embryo back to `Unused`, returning its kernel stack.
    pub(crate) fn release_embryo(&mut self, slot: Slot) -> Option<P::KernelStack> {
        let p = self.proc_mut(slot);
        assert_eq!(p.state, ProcState::Embryo, "release_embryo: not an embryo");
        p.state = ProcState::Unused;
        p.pid = Pid(0);
        p.parent = None;
        p.kstack.take()
    }

    /// `Embryo/Sleeping → Runnable`, enqueued at the current priority.
    pub fn make_runnable(&mut self, slot: Slot) {
        let p = &mut self.procs[slot.index()];
        p.state = ProcState::Runnable;
        self.queues.enqueue(p.priority, slot);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Select the next process and check it out of the ready queues as
    /// `Running`.
    pub fn dispatch(&mut self) -> Option<Slot> {
        let procs = &self.procs;
        let slot = self
            .queues
            .pick_next(|s| procs[s.index()].state == ProcState::Runnable)?;

        let p = &mut self.procs[slot.index()];
        if p.state == ProcState::Running {
            panic!("dispatch: pid {} already running", p.pid);
        }
        p.state = ProcState::Running;
        self.queues.remove(slot);
        trace!("dispatch pid {} at level {}", p.pid, p.priority);
        Some(slot)
    }

    /// Post-switch re-admission. Only a process that came back `Runnable`
    /// returns to the queues; one that slept or exited stays out.
    pub fn readmit(&mut self, slot: Slot) {
        let p = &self.procs[slot.index()];
        if p.state != ProcState::Runnable {
            return;
        }
        // Quantum accounting belongs to the timer path; by the time a
        // process is back here its counter has been folded already.
        debug_assert!(
            p.ticks < quantum(p.priority),
            "pid {} holds {} ticks at level {}",
            p.pid,
            p.ticks,
            p.priority
        );
        self.queues.enqueue(p.priority, slot);
    }

    /// `Running → Runnable`, back at the tail of its level.
    pub fn yield_slot(&mut self, slot: Slot) {
        self.make_runnable(slot);
    }

    /// Charge one timer tick to a running process. Returns `true` when its
    /// quantum is used up: the counter restarts, the process drops one
    /// level (unless already at the bottom) and must yield.
    pub fn charge_tick(&mut self, slot: Slot) -> bool {
        let p = &mut self.procs[slot.index()];
        p.ticks += 1;
        if p.ticks < quantum(p.priority) {
            return false;
        }
        p.ticks = 0;
        if p.priority < NLEVELS - 1 {
            p.priority += 1;
            trace!("pid {} demoted to level {}", p.pid, p.priority);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Sleep / wakeup / kill
    // -----------------------------------------------------------------------

    /// `Running → Sleeping` on `chan`.
    pub fn sleep_on(&mut self, slot: Slot, chan: Channel) {
        self.queues.remove(slot);
        let p = &mut self.procs[slot.index()];
        p.chan = Some(chan);
        p.state = ProcState::Sleeping;
    }

    /// Make every process sleeping on `chan` runnable at its current level.
    pub fn wakeup(&mut self, chan: Channel) {
        for i in 0..NPROC {
            let p = &self.procs[i];
            if p.state == ProcState::Sleeping && p.chan == Some(chan) {
                self.make_runnable(Slot::new(i));
            }
        }
    }

    /// Flag `pid` for termination, waking it if it sleeps.
    pub fn kill(&mut self, pid: Pid) -> Result<()> {
        let slot = self.find(pid).ok_or(Error::NoSuchProcess)?;
        let p = self.proc_mut(slot);
        p.killed = true;
        if p.state == ProcState::Sleeping {
            self.make_runnable(slot);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Reset every live, non-zombie process to level 0 with a fresh quantum.
    pub fn boost_all(&mut self) {
        for i in 0..NPROC {
            let slot = Slot::new(i);
            let p = &mut self.procs[i];
            if matches!(p.state, ProcState::Unused | ProcState::Zombie) {
                continue;
            }
            p.priority = 0;
            p.ticks = 0;
            if p.state == ProcState::Runnable {
                self.queues.remove(slot);
                self.queues.enqueue(0, slot);
            }
        }
        debug!("priority boost at tick {}", self.ticks);
    }

    /// Advance the global tick counter, wake tick sleepers and boost on the
    /// interval. Returns the new tick count.
    pub fn tick(&mut self) -> u64 {
        self.ticks += 1;
        self.wakeup(Channel::Ticks);
        if self.ticks % BOOST_INTERVAL == 0 {
            self.boost_all();
        }
        self.ticks
    }

    // -----------------------------------------------------------------------
    // Termination
    // -----------------------------------------------------------------------

    /// `Running → Zombie`. Children move to the bootstrap process, which
    /// is woken if any of them is already a zombie; the parent is woken on
    /// its own channel.
    pub fn exit_slot(&mut self, slot: Slot) {
        let Some(init) = self.init else {
            panic!("exit: no bootstrap process");
        };
        if slot == init {
            panic!("init exiting");
        }

        let mut orphaned_zombie = false;
        for p in self.procs.iter_mut().filter(|p| p.is_live()) {
            if p.parent == Some(slot) {
                p.parent = Some(init);
                orphaned_zombie |= p.state == ProcState::Zombie;
            }
        }
        if orphaned_zombie {
            self.wakeup(Channel::Proc(init));
        }

        self.queues.remove(slot);
        let p = self.proc_mut(slot);
        p.state = ProcState::Zombie;
        debug!("pid {} exited", p.pid);
        let parent = p.parent;
        if let Some(parent) = parent {
            self.wakeup(Channel::Proc(parent));
        }
    }

    /// `Zombie → Unused` for one zombie child of `parent`.
    pub fn reap_child(&mut self, parent: Slot) -> Reap<P> {
        let mut have_kids = false;
        for i in 0..NPROC {
            let p = &self.procs[i];
            if !p.is_live() || p.parent != Some(parent) {
                continue;
            }
            have_kids = true;
            if p.state != ProcState::Zombie {
                continue;
            }

            let slot = Slot::new(i);
            self.queues.remove(slot);
            let p = &mut self.procs[i];
            let pid = p.pid;
            let kstack = p.kstack.take();
            let space = p.space.take();
            p.state = ProcState::Unused;
            p.pid = Pid(0);
            p.parent = None;
            p.name = ProcName::EMPTY;
            p.killed = false;
            p.size = 0;
            debug!("reaped pid {}", pid);
            return Reap::Reaped { pid, kstack, space };
        }
        if have_kids {
            Reap::Pending
        } else {
            Reap::NoChildren
        }
    }

    /// Panic if the queue-membership invariant is broken anywhere.
    pub fn check_invariants(&self) {
        for (i, p) in self.procs.iter().enumerate() {
            let n = self.queues.occurrences(Slot::new(i));
            assert!(n <= 1, "slot {} queued {} times", i, n);
            assert_eq!(
                p.state == ProcState::Runnable,
                n == 1,
                "slot {} is {} with {} queue entries",
                i,
                p.state,
                n
            );
        }
    }
}

impl<P: Platform> Default for ProcTable<P> {
    fn default() -> Self {
        Self::new()
    }
}
