//! Compile-time configuration
//!
//! These constants control the resource limits of the kernel. All kernel
//! objects live in fixed pools sized here; nothing is allocated at runtime.

/// Maximum number of tasks, idle task included
pub const CFG_TASKS_MAX: usize = 16;

/// Number of mutexes in the mutex pool
pub const CFG_MUTEX_MAX: usize = 8;

/// Number of queues in the queue pool
pub const CFG_QUEUE_MAX: usize = 8;

/// Largest capacity a single queue may be created with
pub const CFG_QUEUE_SIZE_MAX: usize = 16;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Core clock used to derive the SysTick reload value
pub const CFG_CPU_CLOCK_HZ: u32 = 48_000_000;

/// Minimum task stack size in words.
///
/// Room for an extended (FPU) saved frame plus a little headroom.
pub const CFG_STK_SIZE_MIN: usize = 48;
