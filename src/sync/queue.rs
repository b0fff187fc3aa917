//! Bounded message queue
//!
//! A fixed-capacity ring of opaque message pointers. Senders block while the
//! ring is full, receivers while it is empty, and a queue never holds both
//! kinds of waiter at once. A message sent to a waiting receiver skips the
//! ring entirely.

use crate::config::{CFG_QUEUE_MAX, CFG_QUEUE_SIZE_MAX};
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::port::Port;
use crate::sched::list::{BlockedLink, TaskList};
use crate::svc::SvcReturn;
use crate::time::check_timeout;
use crate::types::{task_flags, BlockedOn, OsMsg, OsTick, QueueId, QueueStatus};

/// Queue control block
pub struct OsQueue {
    pub(crate) messages: [OsMsg; CFG_QUEUE_SIZE_MAX],
    /// Capacity chosen at creation
    pub(crate) size: usize,
    /// Messages currently stored
    pub(crate) number: usize,
    /// Next slot to write
    pub(crate) write: usize,
    /// Next slot to read
    pub(crate) read: usize,
    pub(crate) status: QueueStatus,
    /// Blocked senders or receivers, FIFO
    pub(crate) blocked: TaskList<BlockedLink>,
}

impl OsQueue {
    pub const EMPTY: OsQueue = OsQueue {
        messages: [core::ptr::null_mut(); CFG_QUEUE_SIZE_MAX],
        size: 0,
        number: 0,
        write: 0,
        read: 0,
        status: QueueStatus::Fine,
        blocked: TaskList::new(),
    };

    #[inline]
    fn is_full(&self) -> bool {
        self.number == self.size
    }

    fn push(&mut self, msg: OsMsg) {
        self.messages[self.write] = msg;
        self.write = (self.write + 1) % self.size;
        self.number += 1;
    }

    fn pop(&mut self) -> Option<OsMsg> {
        if self.number == 0 {
            return None;
        }
        let msg = core::mem::replace(&mut self.messages[self.read], core::ptr::null_mut());
        self.read = (self.read + 1) % self.size;
        self.number -= 1;
        Some(msg)
    }
}

impl<P: Port> Kernel<P> {
    /// Create a queue holding up to `capacity` messages
    ///
    /// # Returns
    /// * `Err(OsError::QMax)` - capacity is 0 or above `CFG_QUEUE_SIZE_MAX`
    /// * `Err(OsError::ObjPoolEmpty)` - all `CFG_QUEUE_MAX` queues in use
    pub fn queue_create(&mut self, capacity: usize) -> OsResult<QueueId> {
        if capacity == 0 || capacity > CFG_QUEUE_SIZE_MAX {
            return Err(OsError::QMax);
        }
        if self.nqueues >= CFG_QUEUE_MAX {
            return Err(OsError::ObjPoolEmpty);
        }

        let id = QueueId(self.nqueues as u8);
        let queue = &mut self.queues[id.index()];
        *queue = OsQueue::EMPTY;
        queue.size = capacity;
        self.nqueues += 1;
        Ok(id)
    }

    /// Send a message
    ///
    /// # Arguments
    /// * `msg` - Opaque message pointer
    /// * `timeout` - Maximum ticks to wait for room, 0 to fail immediately
    ///
    /// # Returns
    /// * `Err(OsError::QFull)` - no room and `timeout` is 0
    /// * `Err(OsError::Invalid)` - `timeout` above `OS_TIMEOUT_MAX`, or the
    ///   idle task would have to block
    /// * `Err(OsError::Timeout)` - the caller blocked; the real outcome is
    ///   delivered on resume
    pub fn queue_enqueue(&mut self, id: QueueId, msg: OsMsg, timeout: OsTick) -> OsResult<()> {
        if id.index() >= self.nqueues {
            return Err(OsError::QueueInvalid);
        }
        check_timeout(timeout)?;
        let me = self.running.ok_or(OsError::OsNotRunning)?;
        os_assert!(self, !self.tasks[me.index()].is_blocked());

        let queue = &mut self.queues[id.index()];

        // Direct handoff to the longest-waiting receiver
        if queue.status == QueueStatus::BlockedReceive {
            if let Some(receiver) = queue.blocked.pop_front(&mut self.tasks) {
                if queue.blocked.is_empty() {
                    queue.status = QueueStatus::Fine;
                }
                self.tasks[receiver.index()].clear_wait();
                self.wake(receiver, SvcReturn::ok(msg as usize));
                return Ok(());
            }
        }

        if queue.is_full() {
            if timeout == 0 {
                return Err(OsError::QFull);
            }
            if Some(me) == self.idle {
                return Err(OsError::Invalid);
            }
            queue.status = QueueStatus::BlockedSend;
            queue.blocked.push_back(&mut self.tasks, me);

            let tcb = &mut self.tasks[me.index()];
            tcb.message = msg;
            tcb.blocked_on = BlockedOn::Queue(id);
            self.svc_block(timeout, task_flags::QUEUE);
            return Err(OsError::Timeout);
        }

        queue.status = QueueStatus::Fine;
        queue.push(msg);
        Ok(())
    }

    /// Receive a message
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait for a message, 0 to fail
    ///   immediately
    ///
    /// # Returns
    /// * `Err(OsError::QEmpty)` - nothing queued and `timeout` is 0
    /// * `Err(OsError::Invalid)` - `timeout` above `OS_TIMEOUT_MAX`, or the
    ///   idle task would have to block
    /// * `Err(OsError::Timeout)` - the caller blocked; the message is
    ///   delivered on resume
    pub fn queue_dequeue(&mut self, id: QueueId, timeout: OsTick) -> OsResult<OsMsg> {
        if id.index() >= self.nqueues {
            return Err(OsError::QueueInvalid);
        }
        check_timeout(timeout)?;
        let me = self.running.ok_or(OsError::OsNotRunning)?;
        os_assert!(self, !self.tasks[me.index()].is_blocked());

        let queue = &mut self.queues[id.index()];

        if let Some(msg) = queue.pop() {
            // Room was freed: take in the message of the first blocked sender
            if queue.status == QueueStatus::BlockedSend {
                if let Some(sender) = queue.blocked.pop_front(&mut self.tasks) {
                    let tcb = &mut self.tasks[sender.index()];
                    queue.push(tcb.message);
                    if queue.blocked.is_empty() {
                        queue.status = QueueStatus::Fine;
                    }
                    tcb.clear_wait();
                    self.wake(sender, SvcReturn::SUCCESS);
                }
            }
            return Ok(msg);
        }

        if timeout == 0 {
            return Err(OsError::QEmpty);
        }
        if Some(me) == self.idle {
            return Err(OsError::Invalid);
        }
        queue.status = QueueStatus::BlockedReceive;
        queue.blocked.push_back(&mut self.tasks, me);
        self.tasks[me.index()].blocked_on = BlockedOn::Queue(id);
        self.svc_block(timeout, task_flags::QUEUE);
        Err(OsError::Timeout)
    }

    /// Messages currently stored
    pub fn queue_len(&self, id: QueueId) -> usize {
        self.queues[..self.nqueues].get(id.index()).map_or(0, |q| q.number)
    }

    pub fn queue_capacity(&self, id: QueueId) -> usize {
        self.queues[..self.nqueues].get(id.index()).map_or(0, |q| q.size)
    }

    pub fn queue_status(&self, id: QueueId) -> Option<QueueStatus> {
        self.queues[..self.nqueues].get(id.index()).map(|q| q.status)
    }
}
