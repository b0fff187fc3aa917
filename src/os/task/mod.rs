//! Task management module
//!
//! Task registration and lifecycle control: suspend, resume and the
//! trampoline path taken when a task handler returns.

mod tcb;

pub use tcb::Tcb;

use crate::config::{CFG_STK_SIZE_MIN, CFG_TASKS_MAX};
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::port::{frame, FatalKind, Port};
use crate::sched::by_priority;
use crate::types::{
    OsPrio, OsStkElement, OsState, OsTaskFn, TaskId, TaskStart, TaskStatus, OS_PRIORITY_IDLE,
    OS_PRIORITY_NORMAL,
};

impl<P: Port> Kernel<P> {
    /// Register a task at [`OS_PRIORITY_NORMAL`]
    ///
    /// See [`Kernel::register_task_with_priority`].
    pub fn register_task(
        &mut self,
        name: &'static str,
        start: TaskStart,
        handler: OsTaskFn,
        param: *mut (),
        stack: &'static mut [OsStkElement],
    ) -> OsResult<TaskId> {
        self.register_task_with_priority(name, start, handler, param, stack, OS_PRIORITY_NORMAL)
    }

    /// Register a new task
    ///
    /// The first task registered becomes the idle task: its priority is
    /// forced to [`OS_PRIORITY_IDLE`] and it has to start running.
    ///
    /// # Arguments
    /// * `name` - Task name for debugging
    /// * `start` - Whether the task enters the runqueue right away
    /// * `handler` - Task entry point, receives `param`
    /// * `stack` - Stack region owned by the task from now on
    /// * `priority` - Higher value = more urgent
    ///
    /// # Returns
    /// * `Err(OsError::OsNotInit)` - `initialize` was not called
    /// * `Err(OsError::OsRunning)` - scheduler already started
    /// * `Err(OsError::StkSizeInvalid)` - stack shorter than `CFG_STK_SIZE_MIN`
    /// * `Err(OsError::TaskNoMoreTcb)` - task table full
    /// * `Err(OsError::IdleNotRunning)` - idle task registered suspended
    ///
    /// # Example
    /// ```ignore
    /// static mut IDLE_STK: [OsStkElement; 128] = [0; 128];
    ///
    /// extern "C" fn idle(_: *mut ()) {
    ///     loop { cortex_m::asm::wfi(); }
    /// }
    ///
    /// kernel.register_task("idle", TaskStart::Running, idle, ptr::null_mut(),
    ///     unsafe { &mut *addr_of_mut!(IDLE_STK) })?;
    /// ```
    pub fn register_task_with_priority(
        &mut self,
        name: &'static str,
        start: TaskStart,
        handler: OsTaskFn,
        param: *mut (),
        stack: &'static mut [OsStkElement],
        priority: OsPrio,
    ) -> OsResult<TaskId> {
        match self.state {
            OsState::Initialized | OsState::TasksRegistered => {}
            OsState::Default => return Err(OsError::OsNotInit),
            OsState::Started => return Err(OsError::OsRunning),
        }
        if stack.len() < CFG_STK_SIZE_MIN {
            return Err(OsError::StkSizeInvalid);
        }
        if self.ntasks >= CFG_TASKS_MAX {
            return Err(OsError::TaskNoMoreTcb);
        }

        let is_idle = self.idle.is_none();
        if is_idle && start != TaskStart::Running {
            return Err(OsError::IdleNotRunning);
        }
        let priority = if is_idle { OS_PRIORITY_IDLE } else { priority };

        let id = TaskId(self.ntasks as u8);
        let trampoline = self.port.exit_trampoline();
        let stk_size = stack.len();
        let sp = frame::init_stack(stack, handler, param, trampoline, id.index())?;

        let tcb = &mut self.tasks[id.index()];
        *tcb = Tcb::EMPTY;
        tcb.stk_ptr = sp;
        tcb.stk_base = stack.as_mut_ptr();
        tcb.stk_size = stk_size;
        tcb.name = name;
        tcb.priority = priority;
        tcb.handler = Some(handler);
        tcb.params = param;
        tcb.status = match start {
            TaskStart::Running => TaskStatus::Idle,
            TaskStart::Suspended => TaskStatus::Suspended,
        };

        self.ntasks += 1;
        if is_idle {
            self.idle = Some(id);
        }
        self.all.push_front(&mut self.tasks, id);
        if start == TaskStart::Running {
            self.runqueue.insert_sorted(&mut self.tasks, id, by_priority);
        }
        self.state = OsState::TasksRegistered;

        crate::info!("registered task {} (prio {})", name, priority);
        Ok(id)
    }

    /// Suspend a task
    ///
    /// A task waiting on a mutex or queue gives up its place there; its
    /// blocked call keeps the `Timeout` it already returned.
    ///
    /// # Returns
    /// * `Err(OsError::TaskInvalid)` - unknown task
    /// * `Err(OsError::TaskSuspendIdle)` - the idle task cannot be suspended
    /// * `Err(OsError::TaskNotSuspendable)` - task already suspended or finished
    pub fn task_suspend(&mut self, id: TaskId) -> OsResult<()> {
        let status = self.task_status(id).ok_or(OsError::TaskInvalid)?;
        if Some(id) == self.idle {
            return Err(OsError::TaskSuspendIdle);
        }

        match status {
            TaskStatus::Suspended | TaskStatus::Finished => {
                return Err(OsError::TaskNotSuspendable);
            }
            TaskStatus::Active if self.running == Some(id) => {
                self.tasks[id.index()].status = TaskStatus::Suspended;
                self.leave_cpu(id);
            }
            TaskStatus::Active => {
                // Already chosen for the pending switch
                return Err(OsError::TaskNotSuspendable);
            }
            TaskStatus::Idle => {
                os_assert!(self, self.runqueue.remove(&mut self.tasks, id));
                self.tasks[id.index()].status = TaskStatus::Suspended;
            }
            TaskStatus::Wait => {
                self.detach(id);
                os_assert!(self, self.waitqueue.remove(&mut self.tasks, id));
                let tcb = &mut self.tasks[id.index()];
                tcb.delay = 0;
                tcb.status = TaskStatus::Suspended;
            }
        }

        crate::debug!("suspended {}", self.tasks[id.index()].name);
        Ok(())
    }

    /// Resume a suspended task
    ///
    /// The task re-enters the runqueue; a wait it was suspended in is not
    /// restarted.
    ///
    /// # Returns
    /// * `Err(OsError::TaskInvalid)` - unknown task
    /// * `Err(OsError::TaskNotSuspended)` - task is not suspended
    pub fn task_resume(&mut self, id: TaskId) -> OsResult<()> {
        let status = self.task_status(id).ok_or(OsError::TaskInvalid)?;
        if status != TaskStatus::Suspended {
            return Err(OsError::TaskNotSuspended);
        }

        self.make_ready(id);
        crate::debug!("resumed {}", self.tasks[id.index()].name);
        Ok(())
    }

    /// Called when the running task's handler returns
    pub fn task_finished(&mut self) {
        let Some(id) = self.running else {
            self.fatal(FatalKind::Assertion);
        };

        crate::warn!("task {} finished", self.tasks[id.index()].name);
        if Some(id) == self.idle {
            self.fatal(FatalKind::App);
        }

        self.tasks[id.index()].status = TaskStatus::Finished;
        self.leave_cpu(id);
    }

    /// The running task `id` can no longer run: hand the CPU on
    fn leave_cpu(&mut self, id: TaskId) {
        if self.scheduled.is_none() {
            self.schedule();
        } else {
            self.retire(id);
        }
    }
}
