//! # MLFQOS Configuration
//!
//! Compile-time constants governing the process table, the ready queues
//! and the preemption driver. All limits are fixed at compile time; there is
//! no dynamic allocation.

/// Number of process slots in the process table.
pub const NPROC: usize = 64;

/// Maximum number of execution units (CPUs), each running its own
/// scheduler loop over the shared table.
pub const NCPU: usize = 8;

/// Number of priority levels in the ready-queue set. Level 0 is the
/// highest priority; `NLEVELS - 1` is the lowest.
pub const NLEVELS: usize = 3;

/// Capacity of a single ready-queue level, in process handles.
pub const QUEUE_CAPACITY: usize = 64;

/// Every `BOOST_INTERVAL` ticks all live processes are reset to level 0
/// so that demoted work cannot starve.
pub const BOOST_INTERVAL: u64 = 100;

/// The CPU that advances the global tick counter. Other CPUs only do
/// quantum accounting for their own running process.
pub const TIMEKEEPER_CPU: usize = 0;

/// Bounded length of a process name, in bytes (debugging only).
pub const PROC_NAME_LEN: usize = 16;

/// Timer interrupt frequency in Hz.
pub const TICK_HZ: u32 = 100;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI), used to derive
/// the SysTick reload value on Cortex-M4.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Quantum length of a priority level, in timer ticks: `2^level`.
#[inline]
pub const fn quantum(level: usize) -> u32 {
    1 << level
}

const _: () = assert!(NLEVELS > 0, "at least one priority level is required");
const _: () = assert!(NLEVELS < 32, "quantum of the lowest level must fit in u32");
const _: () = assert!(QUEUE_CAPACITY >= NPROC, "a level must be able to hold every process");
const _: () = assert!(TIMEKEEPER_CPU < NCPU);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantum_doubles_per_level() {
        assert_eq!(quantum(0), 1);
        assert_eq!(quantum(1), 2);
        assert_eq!(quantum(2), 4);
    }
}
