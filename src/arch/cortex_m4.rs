//! # Cortex-M4 Port Layer
//!
//! Interrupt control and the tick source for a single-core ARM Cortex-M4
//! (Thumb-2). The board crate combines [`CortexM4`] with its own address
//! space, resource and context-switch implementations to form a complete
//! [`Platform`](crate::platform::Platform).
//!
//! ## Interrupt masking
//!
//! `push_off`/`pop_off` map onto PRIMASK: set means every configurable
//! interrupt is masked, which is what the scheduling lock needs.
//!
//! ## Tick source
//!
//! SysTick fires at `TICK_HZ` and should be wired to
//! `kernel.trap(Trap::Timer, origin)`, with the origin taken from the
//! exception's EXC_RETURN (thread mode on PSP = user). SysTick is a
//! system exception, so there is nothing to acknowledge afterwards.

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::{asm, interrupt, register};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::platform::{Interrupts, Irq};

/// Interrupt control for the one core of a Cortex-M4.
#[derive(Debug, Default, Clone, Copy)]
pub struct CortexM4;

impl Interrupts for CortexM4 {
    fn cpu_id(&self) -> usize {
        0
    }

    fn interrupts_enabled(&self) -> bool {
        register::primask::read().is_inactive()
    }

    fn enable_interrupts(&self) {
        unsafe { interrupt::enable() }
    }

    fn disable_interrupts(&self) {
        interrupt::disable();
    }

    /// NVIC clears the pending bit on exception entry.
    fn end_of_interrupt(&self, _irq: Irq) {}

    fn idle(&self) {
        asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Give SysTick the lowest exception priority so it never preempts a
/// device handler.
pub fn set_tick_priority(scb: &mut SCB) {
    unsafe { scb.set_priority(SystemHandler::SysTick, 0xFF) };
}
