//! # MLFQOS: Multi-Level Feedback Queue Scheduler Core
//!
//! The process scheduler of a small preemptive kernel: process table,
//! multi-level ready queues, per-CPU scheduler loops, the process
//! lifecycle (fork/exit/wait/sleep/kill) and timer-driven preemption.
//!
//! ## Overview
//!
//! Processes are scheduled by a multi-level feedback queue:
//!
//! - **Strict priority**: level 0 always runs before level 1, and so on
//! - **Round robin** within a level
//! - **Demotion**: a process that uses up its quantum (`2^level` ticks)
//!   drops one level; I/O-bound work that sleeps early stays on top
//! - **Boost**: every `BOOST_INTERVAL` ticks everyone returns to level 0,
//!   so demoted work cannot starve
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │              System calls / trap entry                 │
//! ├────────────────────────────────────────────────────────┤
//! │                Kernel<P> (kernel.rs)                   │
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Scheduler   │  Lifecycle         │  Traps             │
//! │  scheduler.rs│  lifecycle.rs      │  trap.rs           │
//! │  ─ scheduler │  ─ fork / exit     │  ─ timer tick      │
//! │  ─ sched     │  ─ wait / kill     │  ─ faults          │
//! │  ─ yield_now │  ─ sleep / wakeup  │  ─ syscall         │
//! ├──────────────┴────────────────────┴────────────────────┤
//! │   Scheduling lock (sync.rs) · per-CPU state (cpu.rs)   │
//! ├────────────────────────────────────────────────────────┤
//! │  Process table (table.rs) · ready queues (queue.rs)    │
//! │  PCB (proc.rs)                                         │
//! ├────────────────────────────────────────────────────────┤
//! │  Platform traits (platform.rs) · arch/cortex_m4.rs     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically sized
//! - **No `alloc`**: pure `core` only
//! - **Fixed-size tables**: `[Proc; NPROC]`, `[RunQueue; NLEVELS]`,
//!   `[Cpu; NCPU]`
//! - **One lock**: the process table and ready queues sit behind a single
//!   spin lock, reachable only through a [`TableGuard`]

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod cpu;
pub mod error;
pub mod kernel;
mod lifecycle;
pub mod platform;
pub mod proc;
pub mod queue;
mod scheduler;
pub mod sync;
pub mod table;
pub mod trap;

#[cfg(test)]
mod sim;

pub use error::{Error, Result};
pub use kernel::Kernel;
pub use platform::{AddressSpaces, ContextSwitch, Interrupts, Irq, Platform, Resources};
pub use proc::{Channel, Pid, ProcInfo, ProcState};
pub use sync::TableGuard;
pub use trap::{Origin, Trap};
