//! Core type definitions
//!
//! Handles, priorities and the small enums shared by the scheduler and the
//! synchronization primitives.

/// Task priority (higher value = more urgent)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Stack element type
pub type OsStkElement = u32;

/// Task wait flags
pub type OsFlags = u32;

/// Opaque message carried by a queue
pub type OsMsg = *mut ();

/// Mutex recursion counter
pub type OsNestingCtr = u16;

/// Task entry point.
///
/// The context switch jumps straight to this address with the parameter in
/// r0, so it has to use the C calling convention.
pub type OsTaskFn = extern "C" fn(*mut ());

// ============ Priorities ============

pub const OS_PRIORITY_LOWEST: OsPrio = 0x00;
pub const OS_PRIORITY_IDLE: OsPrio = 0x00;
pub const OS_PRIORITY_NORMAL: OsPrio = 0x10;
pub const OS_PRIORITY_HIGHEST: OsPrio = 0xff;

// ============ Handles ============

/// Index of a task slot in the kernel's task table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a mutex in the kernel's mutex pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MutexId(pub(crate) u8);

impl MutexId {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a queue in the kernel's queue pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueId(pub(crate) u8);

impl QueueId {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ============ States ============

/// Global kernel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsState {
    Default = 1,
    Initialized,
    TasksRegistered,
    Started,
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskStatus {
    /// Runnable, waiting in the runqueue
    Idle = 1,
    /// Currently executing
    Active,
    /// Blocked with a deadline, in the waitqueue
    Wait,
    /// Explicitly paused, in neither queue
    Suspended,
    /// Handler returned, in neither queue
    Finished,
}

impl TaskStatus {
    /// Whether the task may be picked by the scheduler
    #[inline]
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskStatus::Idle | TaskStatus::Active)
    }
}

/// How a task enters the system at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskStart {
    Running,
    Suspended,
}

/// Resource a blocked task is queued on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockedOn {
    Nothing,
    Mutex(MutexId),
    Queue(QueueId),
}

/// Queue blocking state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QueueStatus {
    Fine,
    BlockedSend,
    BlockedReceive,
}

// ============ Task flags ============

/// What kind of wait is outstanding on a task
pub mod task_flags {
    use super::OsFlags;

    pub const NONE: OsFlags = 0x0000;
    pub const MUTEX: OsFlags = 0x0001;
    pub const QUEUE: OsFlags = 0x0002;
}
