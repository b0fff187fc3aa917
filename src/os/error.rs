//! Error types
//!
//! Kernel calls return `OsResult`. Results that travel through a saved
//! register frame (service calls, injected wake-up values) are flattened to
//! an [`OsStatus`] class first.

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    /// Unspecified failure
    Error = 1,

    // ============ Blocking ============
    /// Resource unavailable within the timeout, or the call blocked
    Timeout = 100,
    /// Operation was interrupted
    Interrupted = 101,

    // ============ Memory / capacity ============
    /// Insufficient memory or capacity
    Mem = 200,
    /// Queue is full
    QFull = 201,
    /// Queue is empty
    QEmpty = 202,
    /// Requested queue capacity is out of range
    QMax = 203,
    /// No more objects in the mutex or queue pool
    ObjPoolEmpty = 204,
    /// No more task slots
    TaskNoMoreTcb = 205,

    // ============ OS state ============
    /// OS not initialized
    OsNotInit = 300,
    /// OS already initialized or running
    OsRunning = 301,
    /// OS is not running
    OsNotRunning = 302,
    /// No task registered before start
    OsNoTask = 303,

    // ============ Configuration ============
    /// Invalid argument or operation
    Invalid = 400,
    /// Stack too small for a saved frame
    StkSizeInvalid = 401,
    /// Idle task must be registered running
    IdleNotRunning = 402,
    /// Unknown service number
    SvcInvalid = 403,

    // ============ Tasks ============
    /// Task handle does not name a registered task
    TaskInvalid = 500,
    /// The idle task cannot be suspended
    TaskSuspendIdle = 501,
    /// Task is not suspended
    TaskNotSuspended = 502,
    /// Task cannot be suspended in its current state
    TaskNotSuspendable = 503,

    // ============ Mutex / queue handles ============
    /// Mutex handle is invalid
    MutexInvalid = 600,
    /// Mutex recursion overflow
    MutexOvf = 601,
    /// Queue handle is invalid
    QueueInvalid = 602,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;

/// Status word written into r0 of a saved frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum OsStatus {
    Success = 0x0,
    Error = 0x1,
    Timeout = 0x2,
    Mem = 0x3,
    Interrupted = 0x4,
    Invalid = 0x5,
}

impl OsStatus {
    /// Decode a raw status word, unknown values map to `Error`
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x0 => OsStatus::Success,
            0x2 => OsStatus::Timeout,
            0x3 => OsStatus::Mem,
            0x4 => OsStatus::Interrupted,
            0x5 => OsStatus::Invalid,
            _ => OsStatus::Error,
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == OsStatus::Success
    }
}

impl OsError {
    /// Error class as seen through a register frame
    pub fn status(self) -> OsStatus {
        match self {
            OsError::Error => OsStatus::Error,
            OsError::Timeout => OsStatus::Timeout,
            OsError::Interrupted => OsStatus::Interrupted,
            OsError::Mem
            | OsError::QFull
            | OsError::QEmpty
            | OsError::ObjPoolEmpty
            | OsError::TaskNoMoreTcb => OsStatus::Mem,
            OsError::OsNotInit
            | OsError::OsRunning
            | OsError::OsNotRunning
            | OsError::OsNoTask => OsStatus::Error,
            _ => OsStatus::Invalid,
        }
    }

    /// Whether the caller may simply retry later
    #[inline]
    pub fn is_timeout(self) -> bool {
        self.status() == OsStatus::Timeout
    }
}

impl From<OsStatus> for OsError {
    fn from(status: OsStatus) -> Self {
        match status {
            OsStatus::Timeout => OsError::Timeout,
            OsStatus::Mem => OsError::Mem,
            OsStatus::Interrupted => OsError::Interrupted,
            OsStatus::Invalid => OsError::Invalid,
            OsStatus::Success | OsStatus::Error => OsError::Error,
        }
    }
}
