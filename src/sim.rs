//! # Host Simulation Platform
//!
//! A [`Platform`](crate::platform::Platform) for unit tests on the host.
//! Every process is an OS thread ("fiber") and `switch_context` passes a
//! baton between them, so exactly one fiber runs at a time, just as on a
//! single CPU. The test thread itself is fiber 0 and plays the scheduler
//! loop by calling [`Kernel::schedule_once`].
//!
//! Fork cannot clone a running thread, so each process's program is
//! queued with [`Sim::load`] and bound to the next kernel stack prepared
//! for a first dispatch, in order. A process without a queued program
//! exits as soon as it is dispatched.
//!
//! A panic inside a process fiber poisons the simulation: the scheduler
//! fiber is woken and re-raises the message, so the test fails instead
//! of hanging.

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;

use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::platform::{AddressSpaces, ContextSwitch, Interrupts, Irq, Resources};
use crate::proc::Channel;
use crate::trap::{Origin, Trap};

/// Size of the bootstrap image's address space.
pub const INIT_SIZE: usize = 4096;

/// Largest address space `resize_address_space` agrees to build.
pub const MAX_SIZE: usize = 1 << 20;

/// Upper bound on dispatches in [`run`] before the test is declared hung.
const RUN_LIMIT: usize = 10_000;

pub type Program = Box<dyn FnOnce(&'static Kernel<Sim>) + Send>;

thread_local! {
    /// Fiber id of the executing thread. Threads that never set it are the
    /// scheduler fiber.
    static FIBER: Cell<usize> = const { Cell::new(0) };
}

// ---------------------------------------------------------------------------
// Platform values
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SimContext {
    fiber: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    pub pc: usize,
    pub ret: usize,
}

#[derive(Debug, Default)]
pub struct SimStack {
    pub frame: TrapFrame,
}

#[derive(Debug)]
pub struct SimSpace {
    pub size: usize,
}

#[derive(Debug)]
pub struct SimFiles;

/// Live resource counts, for leak checks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub stacks: usize,
    pub spaces: usize,
    pub files: usize,
    pub eoi: usize,
}

// ---------------------------------------------------------------------------
// Baton passing
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Baton {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Baton {
    fn pass(&self) {
        *lock(&self.ready) = true;
        self.cv.notify_one();
    }

    fn wait(&self) {
        let mut ready = lock(&self.ready);
        while !*ready {
            ready = self.cv.wait(ready).unwrap_or_else(PoisonError::into_inner);
        }
        *ready = false;
    }
}

struct Fiber {
    baton: Arc<Baton>,
    program: Option<Program>,
    started: bool,
}

impl Fiber {
    fn new(program: Option<Program>, started: bool) -> Self {
        Self {
            baton: Arc::new(Baton::default()),
            program,
            started,
        }
    }
}

#[derive(Default)]
struct SimState {
    fibers: Vec<Fiber>,
    pending: VecDeque<Program>,
    poison: Option<String>,
    fail_next_dup: bool,
    counters: Counters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Sim
// ---------------------------------------------------------------------------

pub struct Sim {
    irq: AtomicBool,
    state: Mutex<SimState>,
    kernel: OnceLock<&'static Kernel<Sim>>,
}

impl Sim {
    pub fn new() -> Self {
        let state = SimState {
            fibers: vec![Fiber::new(None, true)],
            ..SimState::default()
        };
        Self {
            irq: AtomicBool::new(false),
            state: Mutex::new(state),
            kernel: OnceLock::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    /// Queue the program run by the next process to be created.
    pub fn load<F>(&self, program: F)
    where
        F: FnOnce(&'static Kernel<Sim>) + Send + 'static,
    {
        self.state().pending.push_back(Box::new(program));
    }

    /// Make the next address-space duplication fail.
    pub fn fail_next_dup(&self) {
        self.state().fail_next_dup = true;
    }

    pub fn counters(&self) -> Counters {
        self.state().counters
    }

    fn spawn_fiber(&self, id: usize, baton: Arc<Baton>, program: Option<Program>) {
        let kernel = match self.kernel.get() {
            Some(kernel) => *kernel,
            None => panic!("sim: kernel not attached"),
        };
        let spawned = thread::Builder::new()
            .name(format!("fiber-{}", id))
            .spawn(move || {
                FIBER.with(|f| f.set(id));
                baton.wait();
                let run = panic::catch_unwind(AssertUnwindSafe(|| {
                    unsafe { kernel.fork_return() };
                    if let Some(program) = program {
                        program(kernel);
                    }
                    kernel.exit()
                }));
                if let Err(payload) = run {
                    kernel.platform().poison(payload);
                }
            });
        if let Err(err) = spawned {
            panic!("sim: cannot spawn fiber {}: {}", id, err);
        }
    }

    fn poison(&self, payload: Box<dyn Any + Send>) {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "process fiber panicked".to_string()
        };
        self.disable_interrupts();
        let scheduler = {
            let mut state = self.state();
            state.poison = Some(msg);
            state.fibers[0].baton.clone()
        };
        scheduler.pass();
    }

    /// Put CPU 0 back in the shape the scheduler loop left it in before
    /// the switch, so unwinding out of `schedule_once` releases its guard
    /// cleanly whatever the dead fiber did to the nesting depth.
    fn recover_scheduler(&self) {
        self.disable_interrupts();
        if let Some(kernel) = self.kernel.get() {
            kernel.cpu().set_ncli(1);
        }
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupts for Sim {
    fn cpu_id(&self) -> usize {
        0
    }

    fn interrupts_enabled(&self) -> bool {
        self.irq.load(Ordering::SeqCst)
    }

    fn enable_interrupts(&self) {
        self.irq.store(true, Ordering::SeqCst);
    }

    fn disable_interrupts(&self) {
        self.irq.store(false, Ordering::SeqCst);
    }

    fn end_of_interrupt(&self, _irq: Irq) {
        self.state().counters.eoi += 1;
    }
}

impl AddressSpaces for Sim {
    type AddressSpace = SimSpace;

    fn create_address_space(&self) -> Result<(SimSpace, usize)> {
        self.state().counters.spaces += 1;
        Ok((SimSpace { size: INIT_SIZE }, INIT_SIZE))
    }

    fn duplicate_address_space(&self, src: &SimSpace, size: usize) -> Result<SimSpace> {
        let mut state = self.state();
        if state.fail_next_dup {
            state.fail_next_dup = false;
            return Err(Error::OutOfMemory);
        }
        assert_eq!(src.size, size);
        state.counters.spaces += 1;
        Ok(SimSpace { size })
    }

    fn resize_address_space(
        &self,
        space: &mut SimSpace,
        old_size: usize,
        new_size: usize,
    ) -> Result<usize> {
        assert_eq!(space.size, old_size);
        if new_size > MAX_SIZE {
            return Err(Error::OutOfMemory);
        }
        space.size = new_size;
        Ok(new_size)
    }

    fn destroy_address_space(&self, _space: SimSpace) {
        self.state().counters.spaces -= 1;
    }

    fn switch_to(&self, _space: Option<&SimSpace>) {}
}

impl Resources for Sim {
    type Files = SimFiles;

    fn root_files(&self) -> SimFiles {
        self.state().counters.files += 1;
        SimFiles
    }

    fn duplicate_files(&self, _files: &SimFiles) -> SimFiles {
        self.state().counters.files += 1;
        SimFiles
    }

    fn release_files(&self, _files: SimFiles) {
        self.state().counters.files -= 1;
    }
}

unsafe impl ContextSwitch for Sim {
    type Context = SimContext;
    type KernelStack = SimStack;

    fn alloc_kernel_stack(&self) -> Option<SimStack> {
        self.state().counters.stacks += 1;
        Some(SimStack::default())
    }

    fn free_kernel_stack(&self, _stack: SimStack) {
        self.state().counters.stacks -= 1;
    }

    fn prepare_first_dispatch(&self, _stack: &mut SimStack) -> SimContext {
        let mut state = self.state();
        let program = state.pending.pop_front();
        state.fibers.push(Fiber::new(program, false));
        SimContext {
            fiber: state.fibers.len() - 1,
        }
    }

    fn prepare_user_entry(&self, stack: &mut SimStack) {
        stack.frame.pc = 0;
    }

    fn copy_trap_frame(&self, parent: &SimStack, child: &mut SimStack) {
        child.frame = parent.frame;
        child.frame.ret = 0;
    }

    unsafe fn switch_context(&self, save: *mut SimContext, resume: *const SimContext) {
        let me = FIBER.with(Cell::get);
        (*save).fiber = me;
        let target = (*resume).fiber;

        let (mine, theirs, first) = {
            let mut state = self.state();
            let mine = state.fibers[me].baton.clone();
            let fiber = &mut state.fibers[target];
            let first = if fiber.started {
                None
            } else {
                fiber.started = true;
                Some(fiber.program.take())
            };
            (mine, fiber.baton.clone(), first)
        };
        if let Some(program) = first {
            self.spawn_fiber(target, theirs.clone(), program);
        }
        theirs.pass();
        mine.wait();

        if me == 0 {
            let poison = self.state().poison.take();
            if let Some(msg) = poison {
                self.recover_scheduler();
                panic!("process fiber panicked: {}", msg);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test drivers
// ---------------------------------------------------------------------------

/// A kernel on a fresh simulated machine.
pub fn boot() -> &'static Kernel<Sim> {
    let kernel: &'static Kernel<Sim> = Box::leak(Box::new(Kernel::new(Sim::new())));
    if kernel.platform().kernel.set(kernel).is_err() {
        unreachable!("fresh sim already attached");
    }
    kernel
}

/// Run the scheduler loop until nothing is runnable. Returns the number of
/// dispatches.
pub fn run(kernel: &Kernel<Sim>) -> usize {
    let mut dispatched = 0;
    while kernel.schedule_once().is_some() {
        dispatched += 1;
        assert!(dispatched < RUN_LIMIT, "scheduler never went idle");
    }
    dispatched
}

/// Deliver `trap` as the hardware would: interrupts masked on entry,
/// restored on return.
pub fn raise(kernel: &Kernel<Sim>, trap: Trap, origin: Origin) {
    let platform = kernel.platform();
    let was_enabled = platform.interrupts_enabled();
    platform.disable_interrupts();
    kernel.trap(trap, origin);
    if was_enabled {
        platform.enable_interrupts();
    }
}

static PARKED: u8 = 0;

/// Sleep forever on a channel nobody wakes. The bootstrap process ends its
/// program here since it must never exit.
pub fn park(kernel: &Kernel<Sim>) -> ! {
    loop {
        let table = kernel.lock();
        drop(kernel.sleep_locked(Channel::of(&PARKED), table));
    }
}
