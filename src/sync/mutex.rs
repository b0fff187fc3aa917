//! Recursive mutex
//!
//! Single owner, no priority inheritance. Contending tasks queue in FIFO
//! order and ownership passes straight to the head of that queue when the
//! owner releases its last level.

use crate::config::CFG_MUTEX_MAX;
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::port::{FatalKind, Port};
use crate::sched::list::{BlockedLink, TaskList};
use crate::svc::SvcReturn;
use crate::time::check_timeout;
use crate::types::{task_flags, BlockedOn, MutexId, OsNestingCtr, OsTick, TaskId};

/// Mutex control block
pub struct OsMutex {
    /// Task holding the mutex
    pub(crate) owner: Option<TaskId>,
    /// Recursion depth, non-zero iff `owner` is set
    pub(crate) level: OsNestingCtr,
    /// Tasks waiting to acquire, FIFO
    pub(crate) blocked: TaskList<BlockedLink>,
}

impl OsMutex {
    pub const EMPTY: OsMutex = OsMutex {
        owner: None,
        level: 0,
        blocked: TaskList::new(),
    };
}

impl<P: Port> Kernel<P> {
    /// Create a mutex
    ///
    /// # Returns
    /// * `Err(OsError::ObjPoolEmpty)` - all `CFG_MUTEX_MAX` mutexes in use
    pub fn mutex_create(&mut self) -> OsResult<MutexId> {
        if self.nmutexes >= CFG_MUTEX_MAX {
            return Err(OsError::ObjPoolEmpty);
        }
        let id = MutexId(self.nmutexes as u8);
        self.mutexes[id.index()] = OsMutex::EMPTY;
        self.nmutexes += 1;
        Ok(id)
    }

    /// Acquire the mutex
    ///
    /// Re-acquiring a mutex the caller already owns only bumps its level.
    /// If another task owns it the caller queues up and blocks; the
    /// returned `Timeout` then only reports that decision, the final
    /// outcome is delivered when the caller resumes.
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait, 0 to fail immediately
    ///
    /// # Returns
    /// * `Err(OsError::Timeout)` - mutex busy (or the caller blocked)
    /// * `Err(OsError::MutexOvf)` - recursion counter saturated
    /// * `Err(OsError::Invalid)` - `timeout` above `OS_TIMEOUT_MAX`, or the
    ///   idle task would have to block
    pub fn mutex_acquire(&mut self, id: MutexId, timeout: OsTick) -> OsResult<()> {
        if id.index() >= self.nmutexes {
            return Err(OsError::MutexInvalid);
        }
        check_timeout(timeout)?;
        let me = self.running.ok_or(OsError::OsNotRunning)?;
        let owner = self.mutexes[id.index()].owner;

        match owner {
            None => {
                let mutex = &mut self.mutexes[id.index()];
                mutex.owner = Some(me);
                mutex.level = 1;
                Ok(())
            }
            Some(owner) if owner == me => {
                let mutex = &mut self.mutexes[id.index()];
                if mutex.level == OsNestingCtr::MAX {
                    return Err(OsError::MutexOvf);
                }
                mutex.level += 1;
                Ok(())
            }
            Some(_) if timeout == 0 => Err(OsError::Timeout),
            Some(_) if Some(me) == self.idle => Err(OsError::Invalid),
            Some(_) => {
                os_assert!(self, !self.tasks[me.index()].is_blocked());
                self.mutexes[id.index()].blocked.push_back(&mut self.tasks, me);
                self.tasks[me.index()].blocked_on = BlockedOn::Mutex(id);
                self.svc_block(timeout, task_flags::MUTEX);
                Err(OsError::Timeout)
            }
        }
    }

    /// Release one level of the mutex
    ///
    /// Releasing a mutex that is free or held by another task is fatal.
    pub fn mutex_release(&mut self, id: MutexId) -> OsResult<()> {
        if id.index() >= self.nmutexes {
            return Err(OsError::MutexInvalid);
        }
        let me = self.running.ok_or(OsError::OsNotRunning)?;

        let held = {
            let mutex = &self.mutexes[id.index()];
            mutex.level > 0 && mutex.owner == Some(me)
        };
        if !held {
            crate::error!("mutex released by a task not holding it");
            self.fatal(FatalKind::Assertion);
        }

        let mutex = &mut self.mutexes[id.index()];
        mutex.level -= 1;
        if mutex.level > 0 {
            return Ok(());
        }
        mutex.owner = None;

        if let Some(next) = mutex.blocked.pop_front(&mut self.tasks) {
            mutex.owner = Some(next);
            mutex.level = 1;
            self.tasks[next.index()].clear_wait();
            self.wake(next, SvcReturn::SUCCESS);
        }

        Ok(())
    }

    /// Task holding the mutex, if any
    pub fn mutex_owner(&self, id: MutexId) -> Option<TaskId> {
        self.mutexes[..self.nmutexes].get(id.index())?.owner
    }

    /// Current recursion depth
    pub fn mutex_level(&self, id: MutexId) -> OsNestingCtr {
        self.mutexes[..self.nmutexes]
            .get(id.index())
            .map_or(0, |m| m.level)
    }
}
