//! # Traps and Preemption
//!
//! Kernel entry from interrupts, faults and system calls.
//!
//! ## Timer tick
//!
//! ```text
//! Trap::Timer
//!   ├─► timekeeper CPU only: ticks += 1, wake tick sleepers,
//!   │                         boost every BOOST_INTERVAL ticks
//!   ├─► running process: charge one tick; quantum used up?
//!   │                     → ticks = 0, drop one level
//!   ├─► acknowledge at the interrupt controller
//!   └─► quantum used up → yield_now()
//! ```
//!
//! The tick path is the only place that charges time, so a process is
//! demoted after exactly `2^level` ticks at a level no matter how often it
//! yields or sleeps in between.
//!
//! ## Kill checks
//!
//! A kill only sets a flag. The victim notices on its way back to user
//! mode (here and in [`Kernel::syscall`]) and inside blocking calls.

use log::warn;

use crate::config::TIMEKEEPER_CPU;
use crate::platform::{Irq, Platform};
use crate::proc::ProcState;
use crate::Kernel;

/// Privilege level the trap was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    User,
    Kernel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// Periodic timer interrupt.
    Timer,
    /// Device interrupt; the device's own driver has already run.
    Device(Irq),
    /// Interrupt the controller raised without a cause.
    Spurious(Irq),
    /// CPU exception (page fault, illegal instruction, ...).
    Fault { code: u32 },
}

impl<P: Platform> Kernel<P> {
    /// Common trap handler. Entered with interrupts disabled.
    pub fn trap(&self, trap: Trap, origin: Origin) {
        let current = self.current_slot();
        let mut expired = false;

        match trap {
            Trap::Timer => expired = self.timer_tick(),
            Trap::Device(irq) => self.platform().end_of_interrupt(irq),
            Trap::Spurious(irq) => {
                warn!(
                    "cpu {}: spurious interrupt {}",
                    self.platform().cpu_id(),
                    irq.0
                );
                self.platform().end_of_interrupt(irq);
            }
            Trap::Fault { code } => match (origin, current) {
                (Origin::User, Some(slot)) => {
                    let mut table = self.lock();
                    let p = table.proc_mut(slot);
                    warn!("pid {} {}: trap {}, killing", p.pid, p.name, code);
                    p.killed = true;
                }
                _ => panic!(
                    "unexpected trap {} from cpu {} in kernel",
                    code,
                    self.platform().cpu_id()
                ),
            },
        }

        if current.is_none() {
            return;
        }
        if origin == Origin::User {
            self.exit_if_killed();
        }
        if expired {
            self.yield_now();
        }
        if origin == Origin::User {
            self.exit_if_killed();
        }
    }

    /// Account one timer tick. Returns whether the running process has
    /// used up its quantum.
    fn timer_tick(&self) -> bool {
        let expired = {
            let mut table = self.lock();
            if self.platform().cpu_id() == TIMEKEEPER_CPU {
                table.tick();
            }
            match self.cpu().current() {
                Some(slot) if table.proc(slot).state == ProcState::Running => {
                    table.charge_tick(slot)
                }
                _ => false,
            }
        };
        self.platform().end_of_interrupt(Irq::TIMER);
        expired
    }

    /// Run a system call on behalf of the current process, with kill
    /// checks on entry and on the way back to user mode.
    pub fn syscall<R, F>(&self, call: F) -> R
    where
        F: FnOnce(&Self) -> R,
    {
        self.exit_if_killed();
        let ret = call(self);
        self.exit_if_killed();
        ret
    }

    /// Has the current process been asked to terminate?
    pub fn killed(&self) -> bool {
        let slot = self.current();
        self.lock().proc(slot).killed
    }

    fn exit_if_killed(&self) {
        if self.killed() {
            self.exit();
        }
    }
}
