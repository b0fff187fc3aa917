//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin among equal
//! priorities. Expired waits are served before anything else.
//!
//! Deciding who runs next ([`Kernel::schedule`], [`Kernel::dispatch`]) is
//! separate from the register switch itself, which the port performs later
//! by calling [`Kernel::switch_context`].

pub mod list;

pub use list::TaskList;

use crate::os::time::{deadline_before, deadline_elapsed};
use crate::port::{frame, FatalKind, Port};
use crate::task::Tcb;
use crate::kernel::Kernel;
use crate::types::{BlockedOn, OsStkElement, OsState, QueueStatus, TaskId, TaskStatus};

/// Runqueue order: higher priority first, FIFO among equals
#[inline]
pub(crate) fn by_priority(new: &Tcb, node: &Tcb) -> bool {
    new.priority > node.priority
}

/// Waitqueue order: earlier deadline first, FIFO among equals
#[inline]
pub(crate) fn by_deadline(new: &Tcb, node: &Tcb) -> bool {
    deadline_before(new.delay, node.delay)
}

impl<P: Port> Kernel<P> {
    /// Main scheduling point
    ///
    /// Called on every tick while started, and by blocking calls that
    /// need a decision right away. Does nothing while a switch is pending.
    pub fn schedule(&mut self) {
        if self.state != OsState::Started {
            return;
        }
        let Some(cur) = self.running else {
            self.fatal(FatalKind::Assertion);
        };

        self.stack_check(cur);

        if self.scheduled.is_some() {
            return;
        }
        os_assert!(self, self.runqueue.contains(&self.tasks, cur));

        // Timed-out waits get the CPU regardless of priority
        if let Some(due) = self.waitqueue.head() {
            let now = self.port.uptime();
            if deadline_elapsed(now, self.tasks[due.index()].delay) {
                self.dispatch(due);
                return;
            }
        }

        let cur_prio = self.tasks[cur.index()].priority;
        let runnable = self.tasks[cur.index()].is_runnable();

        // Circular scan over every other task, starting after `cur`
        let mut best: Option<TaskId> = None;
        let mut next = self.successor(cur);
        while let Some(id) = next {
            if id == cur {
                break;
            }
            let tcb = &self.tasks[id.index()];
            if tcb.is_runnable()
                && best.map_or(true, |b| tcb.priority > self.tasks[b.index()].priority)
            {
                best = Some(id);
            }
            next = self.successor(id);
        }

        match best {
            Some(id) if !runnable || self.tasks[id.index()].priority >= cur_prio => {
                self.dispatch(id)
            }
            Some(_) => {}
            None if runnable => {}
            // The idle task should have been eligible
            None => self.fatal(FatalKind::Assertion),
        }
    }

    /// Next task in the runqueue, wrapping around at the tail
    fn successor(&self, id: TaskId) -> Option<TaskId> {
        self.runqueue
            .next_of(&self.tasks, id)
            .or_else(|| self.runqueue.head())
    }

    /// Record `target` as the next task and request the switch
    pub(crate) fn dispatch(&mut self, target: TaskId) {
        os_assert!(self, self.scheduled.is_none());
        let Some(prev) = self.running else {
            self.fatal(FatalKind::Assertion);
        };
        os_assert!(self, target != prev);

        self.detach(target);
        if self.tasks[target.index()].status == TaskStatus::Wait {
            os_assert!(self, self.waitqueue.remove(&mut self.tasks, target));
            let tcb = &mut self.tasks[target.index()];
            tcb.delay = 0;
            tcb.status = TaskStatus::Idle;
            self.runqueue.insert_sorted(&mut self.tasks, target, by_priority);
        }
        os_assert!(self, self.tasks[target.index()].status == TaskStatus::Idle);

        self.retire(prev);

        self.tasks[target.index()].status = TaskStatus::Active;
        self.scheduled = Some(target);
        crate::trace!(
            "dispatch {} -> {}",
            self.tasks[prev.index()].name,
            self.tasks[target.index()].name
        );

        self.stack_check(prev);
        self.stack_check(target);
        self.port.request_switch();
    }

    /// Move a task that stops running into the list its status calls for
    pub(crate) fn retire(&mut self, id: TaskId) {
        match self.tasks[id.index()].status {
            TaskStatus::Active | TaskStatus::Idle => {
                self.tasks[id.index()].status = TaskStatus::Idle;
            }
            TaskStatus::Wait => {
                os_assert!(self, self.runqueue.remove(&mut self.tasks, id));
                self.waitqueue.insert_sorted(&mut self.tasks, id, by_deadline);
            }
            TaskStatus::Suspended | TaskStatus::Finished => {
                os_assert!(self, self.runqueue.remove(&mut self.tasks, id));
            }
        }
    }

    /// Put a waiting or suspended task back into the runqueue
    pub(crate) fn make_ready(&mut self, id: TaskId) {
        self.detach(id);
        if self.tasks[id.index()].status == TaskStatus::Wait {
            os_assert!(self, self.waitqueue.remove(&mut self.tasks, id));
        }

        let tcb = &mut self.tasks[id.index()];
        tcb.delay = 0;
        tcb.status = TaskStatus::Idle;
        self.runqueue.insert_sorted(&mut self.tasks, id, by_priority);
    }

    /// Take a task off the blocked list of the mutex or queue it waits on
    pub(crate) fn detach(&mut self, id: TaskId) {
        match self.tasks[id.index()].blocked_on {
            BlockedOn::Nothing => {}
            BlockedOn::Mutex(m) => {
                let removed = self.mutexes[m.index()].blocked.remove(&mut self.tasks, id);
                os_assert!(self, removed);
            }
            BlockedOn::Queue(q) => {
                let removed = self.queues[q.index()].blocked.remove(&mut self.tasks, id);
                os_assert!(self, removed);
                let queue = &mut self.queues[q.index()];
                if queue.blocked.is_empty() {
                    queue.status = QueueStatus::Fine;
                }
            }
        }
        self.tasks[id.index()].clear_wait();
    }

    // ============ Context switch ============

    /// Swap the running task for the scheduled one
    ///
    /// Called by the port's switch handler with the stack pointer it just
    /// saved for the outgoing task (null before the very first switch).
    /// Returns the stack pointer to restore, with any pending service
    /// result already written into the incoming task's frame.
    ///
    /// # Safety
    /// `saved_sp` must be null or point at a complete saved frame on the
    /// running task's own stack.
    pub unsafe fn switch_context(&mut self, saved_sp: *mut OsStkElement) -> *mut OsStkElement {
        if saved_sp.is_null() {
            if let Some(next) = self.scheduled.take() {
                self.running = Some(next);
            }
        } else {
            let Some(next) = self.scheduled.take() else {
                return saved_sp;
            };
            if let Some(prev) = self.running {
                self.tasks[prev.index()].stk_ptr = saved_sp;
            }
            self.running = Some(next);
        }

        let Some(cur) = self.running else {
            return saved_sp;
        };
        let tcb = &mut self.tasks[cur.index()];
        if let Some(ret) = tcb.pending.take() {
            // SAFETY: the task is not running and its stack holds the frame
            // saved on its last switch out
            unsafe { frame::inject_return(tcb.stk_ptr, ret) };
            tcb.delivered = Some(ret);
        }
        tcb.stk_ptr
    }

    /// Perform a pending switch without real hardware
    ///
    /// Returns true if a switch took place.
    pub fn complete_switch(&mut self) -> bool {
        if self.scheduled.is_none() {
            return false;
        }
        let sp = self
            .running
            .map_or(core::ptr::null_mut(), |id| self.tasks[id.index()].stk_ptr);
        // SAFETY: `sp` is the frame the kernel itself built or saved for the
        // running task
        unsafe { self.switch_context(sp) };
        true
    }

    /// Periodic tick entry
    #[inline]
    pub fn tick(&mut self) {
        self.schedule();
    }
}
