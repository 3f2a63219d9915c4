//! # Errors
//!
//! Recoverable failures reported to callers. Broken kernel invariants are
//! not represented here: they halt the system with a `panic!` naming the
//! invariant.

use core::fmt;

/// Recoverable kernel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Every process slot is in use.
    NoFreeSlot,
    /// A kernel stack or address space could not be allocated.
    OutOfMemory,
    /// `wait()` was called by a process without children.
    NoChildren,
    /// No live process has the requested pid.
    NoSuchProcess,
    /// The caller was killed while blocked.
    Killed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NoFreeSlot => "process table full",
            Error::OutOfMemory => "out of memory",
            Error::NoChildren => "no children",
            Error::NoSuchProcess => "no such process",
            Error::Killed => "killed",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
