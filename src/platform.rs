//! # Platform Interfaces
//!
//! The scheduler core is generic over the machine it runs on. Everything it
//! consumes but does not implement is a trait here: interrupt control,
//! address spaces, file-table duplication, kernel stacks and the raw
//! context switch. [`Platform`] bundles them and is implemented automatically
//! for any type that provides all of them.
//!
//! ```text
//! ┌──────────────────────── Kernel<P: Platform> ────────────────────────┐
//! │  scheduler loop · fork/exit/wait · sleep/wakeup · timer accounting  │
//! └──────┬──────────────┬────────────────┬────────────────┬─────────────┘
//!        │              │                │                │
//!   Interrupts    AddressSpaces      Resources      ContextSwitch
//!   (cpu id, IF,  (create, dup,      (file table,   (kernel stacks,
//!    EOI, idle)    resize, switch)    cwd)           trap frame, swtch)
//! ```

use crate::error::Result;

/// Hardware interrupt line, as understood by the interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Irq(pub u8);

impl Irq {
    pub const TIMER: Irq = Irq(0);
}

/// Per-CPU interrupt control.
pub trait Interrupts {
    /// Identifier of the executing CPU, in `0..NCPU`.
    fn cpu_id(&self) -> usize;

    fn interrupts_enabled(&self) -> bool;

    fn enable_interrupts(&self);

    fn disable_interrupts(&self);

    /// Acknowledge a serviced interrupt at the interrupt controller.
    fn end_of_interrupt(&self, irq: Irq);

    /// Called by the scheduler loop when nothing is runnable.
    fn idle(&self) {}
}

/// User address-space management.
pub trait AddressSpaces {
    type AddressSpace: Send;

    /// Build the bootstrap process's address space from the built-in
    /// init image. Returns the space and its size in bytes.
    fn create_address_space(&self) -> Result<(Self::AddressSpace, usize)>;

    /// Copy the first `size` bytes of `src` into a fresh address space.
    fn duplicate_address_space(
        &self,
        src: &Self::AddressSpace,
        size: usize,
    ) -> Result<Self::AddressSpace>;

    /// Grow or shrink `space` from `old_size` to `new_size` bytes. Returns
    /// the resulting size.
    fn resize_address_space(
        &self,
        space: &mut Self::AddressSpace,
        old_size: usize,
        new_size: usize,
    ) -> Result<usize>;

    fn destroy_address_space(&self, space: Self::AddressSpace);

    /// Install `space`, or the kernel-only mapping for `None`.
    fn switch_to(&self, space: Option<&Self::AddressSpace>);
}

/// Per-process resources duplicated on fork: open files and the working
/// directory.
pub trait Resources {
    type Files: Send;

    /// File table of the bootstrap process (no open files, cwd "/").
    fn root_files(&self) -> Self::Files;

    fn duplicate_files(&self, files: &Self::Files) -> Self::Files;

    /// Close every open file and drop the working-directory reference.
    fn release_files(&self, files: Self::Files);
}

/// Kernel stacks and the raw context-switch primitive.
///
/// # Safety
/// `switch_context` must save the callee-saved state of the caller into
/// `save`, resume `resume`, and return only when some later switch
/// resumes `save`. A context produced by `prepare_first_dispatch` must,
/// when first resumed, call [`Kernel::fork_return`](crate::Kernel::fork_return)
/// before running anything else.
pub unsafe trait ContextSwitch {
    /// Saved callee-saved registers of a suspended kernel thread.
    type Context: Default + Send;
    type KernelStack: Send;

    fn alloc_kernel_stack(&self) -> Option<Self::KernelStack>;

    fn free_kernel_stack(&self, stack: Self::KernelStack);

    /// Lay out a synthetic frame on `stack` so that the first switch into
    /// the returned context lands in the fork-return trampoline and from
    /// there returns to user mode through the stack's trap frame.
    fn prepare_first_dispatch(&self, stack: &mut Self::KernelStack) -> Self::Context;

    /// Point the bootstrap process's trap frame at the start of its image.
    fn prepare_user_entry(&self, stack: &mut Self::KernelStack);

    /// Copy the parent's trap frame to the child, making the child's
    /// system call return 0.
    fn copy_trap_frame(&self, parent: &Self::KernelStack, child: &mut Self::KernelStack);

    /// Save the running context into `save` and resume `resume`.
    ///
    /// # Safety
    /// Must be called with the scheduling lock held and no other lock.
    /// Both pointers must stay valid until the call returns.
    unsafe fn switch_context(&self, save: *mut Self::Context, resume: *const Self::Context);
}

/// Everything the scheduler core needs from the machine.
pub trait Platform: Interrupts + AddressSpaces + Resources + ContextSwitch + Sync {}

impl<T> Platform for T where T: Interrupts + AddressSpaces + Resources + ContextSwitch + Sync {}
