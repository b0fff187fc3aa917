//! osdoth: a small preemptive scheduler for single-core Cortex-M parts
//!
//! Provides:
//! - Fixed-priority preemptive scheduling with round-robin among equals
//! - Timed waits served ahead of priority competition
//! - Recursive mutexes and bounded message queues with blocking timeouts
//! - Context switching for ARM Cortex-M, and a simulated port for the host

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

#[macro_use]
pub mod log;
mod lang_items;

pub mod os;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use os::config;
pub use os::config::*;
pub use os::critical;
pub use os::error;
pub use os::error::{OsError, OsResult, OsStatus};
pub use os::kernel;
pub use os::kernel::Kernel;
pub use os::types;
pub use os::types::*;
pub use os::task;
pub use os::sched;
pub use os::svc;
pub use os::time;

pub use sync::mutex;
pub use sync::queue;

pub use port::{FatalKind, Port};
