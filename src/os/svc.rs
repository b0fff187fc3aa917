//! Service calls and the blocking protocol
//!
//! A task blocks by marking itself `Wait` with a deadline and forcing a
//! scheduling decision. Whoever wakes it later stores a [`SvcReturn`] in the
//! task's pending slot; [`Kernel::switch_context`] copies that slot into the
//! saved r0/r1 just before the task resumes, so the blocking call observes
//! the real outcome as its return value.

use crate::error::{OsError, OsResult, OsStatus};
use crate::kernel::Kernel;
use crate::port::Port;
use crate::types::{MutexId, OsFlags, OsTick, QueueId, TaskId, TaskStatus};

/// Result of a service call as it travels through r0/r1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SvcReturn {
    pub status: OsStatus,
    pub value: usize,
}

impl SvcReturn {
    pub const SUCCESS: SvcReturn = SvcReturn::ok(0);

    pub const fn ok(value: usize) -> Self {
        SvcReturn {
            status: OsStatus::Success,
            value,
        }
    }

    pub const fn err(status: OsStatus) -> Self {
        SvcReturn { status, value: 0 }
    }

    pub fn from_result(result: OsResult<usize>) -> Self {
        match result {
            Ok(value) => SvcReturn::ok(value),
            Err(e) => SvcReturn::err(e.status()),
        }
    }

    pub fn into_result(self) -> OsResult<usize> {
        match self.status {
            OsStatus::Success => Ok(self.value),
            status => Err(OsError::from(status)),
        }
    }
}

/// Service numbers, passed in r12 to the SVCall handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Service {
    Delay = 1,
    MutexCreate,
    MutexAcquire,
    MutexRelease,
    QueueCreate,
    QueueEnqueue,
    QueueDequeue,
    TaskSuspend,
    TaskResume,
    TaskFinished,
    TaskSelf,
}

impl TryFrom<u32> for Service {
    type Error = OsError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Ok(match raw {
            1 => Service::Delay,
            2 => Service::MutexCreate,
            3 => Service::MutexAcquire,
            4 => Service::MutexRelease,
            5 => Service::QueueCreate,
            6 => Service::QueueEnqueue,
            7 => Service::QueueDequeue,
            8 => Service::TaskSuspend,
            9 => Service::TaskResume,
            10 => Service::TaskFinished,
            11 => Service::TaskSelf,
            _ => return Err(OsError::SvcInvalid),
        })
    }
}

fn unit(result: OsResult<()>) -> OsResult<usize> {
    result.map(|()| 0)
}

impl<P: Port> Kernel<P> {
    /// Put the running task to sleep for at most `timeout` ticks.
    ///
    /// The caller must already have queued the task on the resource it
    /// waits for, if any.
    pub(crate) fn svc_block(&mut self, timeout: OsTick, flags: OsFlags) {
        let Some(me) = self.running else {
            self.fatal(crate::port::FatalKind::Assertion);
        };
        os_assert!(self, Some(me) != self.idle);

        let now = self.port.uptime();
        let tcb = &mut self.tasks[me.index()];
        tcb.status = TaskStatus::Wait;
        tcb.delay = now.wrapping_add(timeout);
        tcb.flags = flags;

        if self.scheduled.is_none() {
            self.schedule();
        } else {
            self.retire(me);
        }
    }

    /// Hand `ret` to a blocked task and give it the CPU
    pub(crate) fn wake(&mut self, id: TaskId, ret: SvcReturn) {
        self.tasks[id.index()].pending = Some(ret);

        if self.scheduled.is_none() {
            self.dispatch(id);
        } else {
            // A switch is already decided: the task competes on the next tick
            self.make_ready(id);
        }
    }

    /// Execute service `svc` on behalf of the running task
    ///
    /// Arguments are the raw r0-r2 of the caller. Blocking services return
    /// their synchronous outcome here; the final one is injected on resume.
    pub fn service_call(&mut self, svc: u32, args: [usize; 3]) -> SvcReturn {
        let svc = match Service::try_from(svc) {
            Ok(svc) => svc,
            Err(e) => return SvcReturn::err(e.status()),
        };
        crate::trace!("svc {}", svc);

        let result = match svc {
            Service::Delay => unit(self.task_delay(args[0] as OsTick)),
            Service::MutexCreate => self.mutex_create().map(|m| m.index()),
            Service::MutexAcquire => self
                .mutex_id(args[0])
                .and_then(|m| self.mutex_acquire(m, args[1] as OsTick))
                .map(|()| 0),
            Service::MutexRelease => self
                .mutex_id(args[0])
                .and_then(|m| self.mutex_release(m))
                .map(|()| 0),
            Service::QueueCreate => self.queue_create(args[0]).map(|q| q.index()),
            Service::QueueEnqueue => self
                .queue_id(args[0])
                .and_then(|q| self.queue_enqueue(q, args[1] as *mut (), args[2] as OsTick))
                .map(|()| 0),
            Service::QueueDequeue => self
                .queue_id(args[0])
                .and_then(|q| self.queue_dequeue(q, args[1] as OsTick))
                .map(|msg| msg as usize),
            Service::TaskSuspend => self.task_id(args[0]).and_then(|t| unit(self.task_suspend(t))),
            Service::TaskResume => self.task_id(args[0]).and_then(|t| unit(self.task_resume(t))),
            Service::TaskFinished => {
                self.task_finished();
                Ok(0)
            }
            Service::TaskSelf => self.task_self().map(|t| t.index()).ok_or(OsError::OsNotRunning),
        };

        SvcReturn::from_result(result)
    }

    fn task_id(&self, raw: usize) -> OsResult<TaskId> {
        if raw < self.ntasks {
            Ok(TaskId(raw as u8))
        } else {
            Err(OsError::TaskInvalid)
        }
    }

    fn mutex_id(&self, raw: usize) -> OsResult<MutexId> {
        if raw < self.nmutexes {
            Ok(MutexId(raw as u8))
        } else {
            Err(OsError::MutexInvalid)
        }
    }

    fn queue_id(&self, raw: usize) -> OsResult<QueueId> {
        if raw < self.nqueues {
            Ok(QueueId(raw as u8))
        } else {
            Err(OsError::QueueInvalid)
        }
    }
}
