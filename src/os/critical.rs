//! Critical sections
//!
//! Every mutation of kernel state happens with interrupts masked. On the
//! target the mask is taken through the `critical-section` implementation
//! registered in `lib.rs`; on the host (simulation and tests) there is
//! nothing to mask and the guard only tracks nesting.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

/// Nesting depth of live guards
static DEPTH: AtomicU8 = AtomicU8::new(0);

/// RAII guard for critical sections
///
/// Interrupts are masked while at least one guard is alive. The previous
/// interrupt state is restored when the guard is dropped, so guards nest.
pub struct CriticalSection {
    #[cfg(target_arch = "arm")]
    restore: critical_section::RestoreState,
    _private: (),
}

impl CriticalSection {
    /// Enter a critical section
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        let restore = unsafe { critical_section::acquire() };

        DEPTH.fetch_add(1, Ordering::Acquire);
        CriticalSection {
            #[cfg(target_arch = "arm")]
            restore,
            _private: (),
        }
    }

    /// Check if we're currently in a critical section
    #[inline(always)]
    pub fn is_active() -> bool {
        DEPTH.load(Ordering::Acquire) > 0
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        DEPTH.fetch_sub(1, Ordering::Release);

        #[cfg(target_arch = "arm")]
        unsafe {
            critical_section::release(self.restore)
        };
    }
}

/// Execute a closure with interrupts masked
///
/// The closure receives the guard, which unlocks [`CsCell`] contents.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// A cell that can only be accessed within a critical section.
///
/// Holds the one global kernel instance on the target.
pub struct CsCell<T>(UnsafeCell<T>);

// SAFETY: single core, and access requires a live `CriticalSection`
unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Get a mutable reference to the inner value
    ///
    /// The caller must not hold two references from the same cell at once;
    /// the kernel only ever takes one per critical section.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub fn get(&self, _cs: &CriticalSection) -> &mut T {
        unsafe { &mut *self.0.get() }
    }
}
