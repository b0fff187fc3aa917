//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task.

use crate::os::svc::SvcReturn;
use crate::types::{
    BlockedOn, OsFlags, OsMsg, OsPrio, OsStkElement, OsTaskFn, OsTick, TaskId, TaskStatus,
    task_flags,
};

/// Task Control Block
pub struct Tcb {
    // ============ Stack ============
    /// Saved stack pointer, valid while the task is not running
    pub stk_ptr: *mut OsStkElement,
    /// Lowest word of the stack region, holds the guard word
    pub stk_base: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Identification ============
    pub name: &'static str,
    pub status: TaskStatus,
    pub priority: OsPrio,

    // ============ Entry point ============
    pub handler: Option<OsTaskFn>,
    pub params: *mut (),

    // ============ Waiting ============
    /// Absolute wake-up tick, valid only while waiting
    pub delay: OsTick,
    /// Kind of wait outstanding, see [`task_flags`]
    pub flags: OsFlags,
    /// Mutex or queue whose blocked list holds this task
    pub blocked_on: BlockedOn,
    /// Message held back while blocked sending into a full queue
    pub message: OsMsg,
    /// Result to hand back when the task resumes
    pub pending: Option<SvcReturn>,
    /// Last result handed back, at full width
    ///
    /// The saved frame only holds 32-bit registers; on a 64-bit host this
    /// is the one place a delivered pointer survives intact.
    pub delivered: Option<SvcReturn>,

    // ============ List links ============
    /// Next in the all-tasks list
    pub np: Option<TaskId>,
    /// Next in the runqueue or waitqueue
    pub nrp: Option<TaskId>,
    /// Next in a mutex or queue blocked list
    pub nblocked: Option<TaskId>,
}

impl Tcb {
    /// An unused task slot
    pub const EMPTY: Tcb = Tcb {
        stk_ptr: core::ptr::null_mut(),
        stk_base: core::ptr::null_mut(),
        stk_size: 0,

        name: "",
        status: TaskStatus::Idle,
        priority: 0,

        handler: None,
        params: core::ptr::null_mut(),

        delay: 0,
        flags: task_flags::NONE,
        blocked_on: BlockedOn::Nothing,
        message: core::ptr::null_mut(),
        pending: None,
        delivered: None,

        np: None,
        nrp: None,
        nblocked: None,
    };

    /// Whether the task may be picked by the scheduler
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.status.is_runnable()
    }

    /// Whether the task is sitting on a mutex or queue
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.blocked_on != BlockedOn::Nothing
    }

    /// First word of the stack region
    #[inline]
    pub fn guard_word(&self) -> OsStkElement {
        // SAFETY: stk_base points at a registered, never-freed stack
        unsafe { self.stk_base.read_volatile() }
    }

    /// The task's stack region
    ///
    /// # Safety
    /// The task must not be running, otherwise the hardware may be writing
    /// into the same memory.
    pub unsafe fn stack(&self) -> &[OsStkElement] {
        unsafe { core::slice::from_raw_parts(self.stk_base, self.stk_size) }
    }

    /// Forget any outstanding wait
    pub(crate) fn clear_wait(&mut self) {
        self.blocked_on = BlockedOn::Nothing;
        self.flags = task_flags::NONE;
        self.message = core::ptr::null_mut();
        self.nblocked = None;
    }
}

impl Default for Tcb {
    fn default() -> Self {
        Self::EMPTY
    }
}
