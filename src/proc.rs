//! # Process Control Block
//!
//! Defines the per-process record kept in every process-table slot and the
//! small handle types the rest of the kernel passes around.
//!
//! A PCB owns nothing outside the kernel's view: the kernel stack, address
//! space and file table are opaque values handed out by the
//! [`Platform`](crate::platform::Platform) and merely parked here between
//! creation and reaping.

use core::fmt;

use crate::config::PROC_NAME_LEN;
use crate::platform::Platform;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Process identifier. Assigned monotonically, never reused while the
/// process is live. Pid 0 is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a process-table slot. This is the handle stored in the ready
/// queues and in parent links; it is only meaningful while the slot's
/// current occupant is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(usize);

impl Slot {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Sleep channel: identifies what a sleeping process waits for. Wakeups
/// match by equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The global tick counter.
    Ticks,
    /// A process's own identity; `wait()` sleeps here until a child exits.
    Proc(Slot),
    /// Any other kernel object, keyed by its address.
    Addr(usize),
}

impl Channel {
    /// Channel keyed by the address of `object`.
    pub fn of<T: ?Sized>(object: &T) -> Self {
        Channel::Addr(object as *const T as *const () as usize)
    }
}

// ---------------------------------------------------------------------------
// Process state machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a process slot.
///
/// ```text
///            allocate()           fork() / create_first_process()
///   Unused ─────────────► Embryo ─────────────────────────► Runnable
///     ▲                                                      │   ▲
///     │ wait() reaps                          dispatch       │   │ yield / quantum
///     │                                                      ▼   │
///   Zombie ◄──────────────── exit() ─────────────────────── Running
///                                                            │
///                          wakeup() / kill()      sleep()    │
///                Runnable ◄───────────────── Sleeping ◄──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep",
            ProcState::Runnable => "runble",
            ProcState::Running => "run",
            ProcState::Zombie => "zombie",
        }
    }
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Process name
// ---------------------------------------------------------------------------

/// Bounded, inline process name. Longer names are truncated on a UTF-8
/// character boundary.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProcName {
    bytes: [u8; PROC_NAME_LEN],
    len: usize,
}

impl ProcName {
    pub const EMPTY: Self = Self {
        bytes: [0; PROC_NAME_LEN],
        len: 0,
    };

    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(PROC_NAME_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0; PROC_NAME_LEN];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self { bytes, len }
    }

    pub fn as_str(&self) -> &str {
        // Only ever filled from a `&str` cut on a char boundary.
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl fmt::Display for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

// ---------------------------------------------------------------------------
// Process Control Block
// ---------------------------------------------------------------------------

/// Process Control Block, one per process-table slot.
///
/// Every field is guarded by the scheduling lock; the table is only
/// reachable through a [`TableGuard`](crate::sync::TableGuard).
pub struct Proc<P: Platform> {
    /// Process id; `Pid(0)` while the slot is unused.
    pub pid: Pid,
    pub name: ProcName,
    pub state: ProcState,
    /// Ready-queue level, 0 = highest.
    pub priority: usize,
    /// Ticks consumed at the current level.
    pub ticks: u32,
    /// Parent slot. A lookup relation only: the parent owns nothing.
    pub parent: Option<Slot>,
    /// Set while sleeping.
    pub chan: Option<Channel>,
    /// Termination requested; acted on at the next kill-check point.
    pub killed: bool,
    /// Size of the user address space in bytes.
    pub size: usize,

    pub(crate) context: P::Context,
    pub(crate) kstack: Option<P::KernelStack>,
    pub(crate) space: Option<P::AddressSpace>,
    pub(crate) files: Option<P::Files>,
}

impl<P: Platform> Proc<P> {
    pub(crate) fn new() -> Self {
        Self {
            pid: Pid(0),
            name: ProcName::EMPTY,
            state: ProcState::Unused,
            priority: 0,
            ticks: 0,
            parent: None,
            chan: None,
            killed: false,
            size: 0,
            context: P::Context::default(),
            kstack: None,
            space: None,
            files: None,
        }
    }

    /// True for every state that belongs to a process (not `Unused`).
    #[inline]
    pub fn is_live(&self) -> bool {
        self.state != ProcState::Unused
    }

    pub fn info(&self) -> ProcInfo {
        ProcInfo {
            pid: self.pid,
            state: self.state,
            name: self.name,
            priority: self.priority,
            ticks: self.ticks,
        }
    }
}

/// Read-only view of a process for the debug dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: Pid,
    pub state: ProcState,
    pub name: ProcName,
    pub priority: usize,
    pub ticks: u32,
}

impl fmt::Display for ProcInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<6} {} pri:{} ticks:{}",
            self.pid, self.state, self.name, self.priority, self.ticks
        )
    }
}
