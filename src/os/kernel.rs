//! Kernel state and lifecycle
//!
//! [`Kernel`] owns everything the scheduler works on: the fixed task table,
//! the all-tasks list, the runqueue and waitqueue, and the mutex and queue
//! pools. It is generic over the [`Port`] that supplies the clock, the
//! context-switch trigger and the fatal-error sink.

use crate::config::{CFG_MUTEX_MAX, CFG_QUEUE_MAX, CFG_TASKS_MAX};
use crate::error::{OsError, OsResult};
use crate::port::frame::STACK_GUARD_WORD;
use crate::port::{FatalKind, Port};
use crate::sched::list::{AllLink, QueueLink, TaskList};
use crate::sync::mutex::OsMutex;
use crate::sync::queue::OsQueue;
use crate::task::Tcb;
use crate::types::{OsState, TaskId, TaskStatus};

/// Scheduler context
pub struct Kernel<P: Port> {
    pub(crate) port: P,
    pub(crate) state: OsState,

    // ============ Tasks ============
    pub(crate) ntasks: usize,
    pub(crate) idle: Option<TaskId>,
    pub(crate) tasks: [Tcb; CFG_TASKS_MAX],
    /// Every registered task, newest first
    pub(crate) all: TaskList<AllLink>,
    /// Runnable tasks by descending priority
    pub(crate) runqueue: TaskList<QueueLink>,
    /// Waiting tasks by ascending deadline
    pub(crate) waitqueue: TaskList<QueueLink>,
    pub(crate) running: Option<TaskId>,
    /// Set only while a switch is in flight
    pub(crate) scheduled: Option<TaskId>,

    // ============ Synchronization objects ============
    pub(crate) nmutexes: usize,
    pub(crate) mutexes: [OsMutex; CFG_MUTEX_MAX],
    pub(crate) nqueues: usize,
    pub(crate) queues: [OsQueue; CFG_QUEUE_MAX],
}

impl<P: Port> Kernel<P> {
    /// A kernel in the `Default` state
    pub const fn new(port: P) -> Self {
        Kernel {
            port,
            state: OsState::Default,
            ntasks: 0,
            idle: None,
            tasks: [Tcb::EMPTY; CFG_TASKS_MAX],
            all: TaskList::new(),
            runqueue: TaskList::new(),
            waitqueue: TaskList::new(),
            running: None,
            scheduled: None,
            nmutexes: 0,
            mutexes: [OsMutex::EMPTY; CFG_MUTEX_MAX],
            nqueues: 0,
            queues: [OsQueue::EMPTY; CFG_QUEUE_MAX],
        }
    }

    /// Move from `Default` to `Initialized`
    ///
    /// # Returns
    /// * `Err(OsError::OsRunning)` - already initialized
    pub fn initialize(&mut self) -> OsResult<()> {
        if self.state != OsState::Default {
            return Err(OsError::OsRunning);
        }
        self.state = OsState::Initialized;
        Ok(())
    }

    /// Start scheduling
    ///
    /// Brings up the platform, makes the head of the runqueue the running
    /// task and asks the port to switch to it.
    ///
    /// # Returns
    /// * `Err(OsError::OsNotInit)` - `initialize` was not called
    /// * `Err(OsError::OsNoTask)` - no task registered yet
    /// * `Err(OsError::OsRunning)` - already started
    pub fn start(&mut self) -> OsResult<()> {
        match self.state {
            OsState::Default => return Err(OsError::OsNotInit),
            OsState::Initialized => return Err(OsError::OsNoTask),
            OsState::Started => return Err(OsError::OsRunning),
            OsState::TasksRegistered => {}
        }

        self.port.platform_setup()?;

        let Some(first) = self.runqueue.head() else {
            return Err(OsError::OsNoTask);
        };
        self.tasks[first.index()].status = TaskStatus::Active;
        self.running = Some(first);
        self.scheduled = None;
        self.state = OsState::Started;

        crate::info!(
            "starting with {} tasks, first: {}",
            self.ntasks,
            self.tasks[first.index()].name
        );

        self.port.start_first()
    }

    /// Drop every task, mutex and queue and go back to `Default`
    ///
    /// The port and its clock are left untouched.
    pub fn teardown(&mut self) {
        self.state = OsState::Default;
        self.ntasks = 0;
        self.idle = None;
        self.tasks = [Tcb::EMPTY; CFG_TASKS_MAX];
        self.all.clear();
        self.runqueue.clear();
        self.waitqueue.clear();
        self.running = None;
        self.scheduled = None;
        self.nmutexes = 0;
        self.mutexes = [OsMutex::EMPTY; CFG_MUTEX_MAX];
        self.nqueues = 0;
        self.queues = [OsQueue::EMPTY; CFG_QUEUE_MAX];
    }

    // ============ Accessors ============

    #[inline]
    pub fn state(&self) -> OsState {
        self.state
    }

    /// Number of registered tasks
    #[inline]
    pub fn task_count(&self) -> usize {
        self.ntasks
    }

    #[inline]
    pub fn idle_task(&self) -> Option<TaskId> {
        self.idle
    }

    /// Task currently executing
    #[inline]
    pub fn task_self(&self) -> Option<TaskId> {
        self.running
    }

    /// Task a pending switch will resume
    #[inline]
    pub fn scheduled(&self) -> Option<TaskId> {
        self.scheduled
    }

    pub fn task(&self, id: TaskId) -> Option<&Tcb> {
        self.tasks[..self.ntasks].get(id.index())
    }

    pub fn task_name(&self, id: TaskId) -> Option<&'static str> {
        self.task(id).map(|t| t.name)
    }

    pub fn task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.task(id).map(|t| t.status)
    }

    /// Runqueue, front to back
    pub fn runqueue(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.runqueue.iter(&self.tasks)
    }

    /// Waitqueue, earliest deadline first
    pub fn waitqueue(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.waitqueue.iter(&self.tasks)
    }

    /// All registered tasks, newest first
    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.all.iter(&self.tasks)
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline]
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    // ============ Invariant checks ============

    /// Report an unrecoverable error to the port
    pub(crate) fn fatal(&mut self, kind: FatalKind) -> ! {
        crate::error!("fatal error: {}", kind);
        self.port.fatal(kind)
    }

    /// Halt if the guard word at the base of `id`'s stack was overwritten
    pub(crate) fn stack_check(&mut self, id: TaskId) {
        if self.tasks[id.index()].guard_word() != STACK_GUARD_WORD {
            crate::error!("stack overflow in {}", self.tasks[id.index()].name);
            self.fatal(FatalKind::StackOverflow);
        }
    }
}
