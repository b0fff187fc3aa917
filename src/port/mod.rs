//! Port layer - CPU-specific implementations
//!
//! The kernel reaches the hardware only through [`Port`]: a tick clock, a
//! way to request the register switch and a sink for fatal errors. The
//! Cortex-M4 port is compiled for ARM targets; everywhere else the
//! simulated port lets the scheduler run on the host.

pub mod frame;

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(not(target_arch = "arm"))]
pub mod sim;

use crate::error::OsResult;
use crate::types::OsTick;

/// Kind of unrecoverable error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalKind {
    /// A kernel invariant does not hold
    Assertion,
    /// A stack guard word was overwritten
    StackOverflow,
    /// The application broke a rule, e.g. the idle task returned
    App,
}

/// Platform services used by the kernel
pub trait Port {
    /// One-shot hardware bring-up, run by `Kernel::start`
    fn platform_setup(&mut self) -> OsResult<()>;

    /// Monotonic tick counter
    fn uptime(&self) -> OsTick;

    /// Busy wait, usable only outside the scheduler
    fn delay(&mut self, ticks: OsTick);

    /// Ask for the switch to the scheduled task
    ///
    /// Must be idempotent; the switch handler calls
    /// `Kernel::switch_context` once it runs.
    fn request_switch(&mut self);

    /// Arrange for the first task to be entered
    ///
    /// On hardware the first switch happens as soon as interrupts are
    /// unmasked again.
    fn start_first(&mut self) -> OsResult<()>;

    /// Address a task returns to when its handler ends
    fn exit_trampoline(&self) -> usize;

    /// Stop the system
    fn fatal(&mut self, kind: FatalKind) -> !;
}
