//! Intrusive singly linked task lists
//!
//! Tasks live in the kernel's fixed task table and are chained through one of
//! three link fields of their TCB: `np` for the all-tasks list, `nrp` for the
//! runqueue or waitqueue, `nblocked` for a mutex/queue blocked list. A list
//! only stores its head; nodes are addressed by [`TaskId`].

use core::marker::PhantomData;

use crate::task::Tcb;
use crate::types::TaskId;

/// Selects which link field of a TCB a list is threaded through
pub trait Link {
    fn next(tcb: &Tcb) -> Option<TaskId>;
    fn set_next(tcb: &mut Tcb, next: Option<TaskId>);
}

/// Link for the list of every registered task
pub struct AllLink;
/// Link shared by the runqueue and the waitqueue
pub struct QueueLink;
/// Link for mutex and queue blocked lists
pub struct BlockedLink;

impl Link for AllLink {
    #[inline(always)]
    fn next(tcb: &Tcb) -> Option<TaskId> {
        tcb.np
    }
    #[inline(always)]
    fn set_next(tcb: &mut Tcb, next: Option<TaskId>) {
        tcb.np = next;
    }
}

impl Link for QueueLink {
    #[inline(always)]
    fn next(tcb: &Tcb) -> Option<TaskId> {
        tcb.nrp
    }
    #[inline(always)]
    fn set_next(tcb: &mut Tcb, next: Option<TaskId>) {
        tcb.nrp = next;
    }
}

impl Link for BlockedLink {
    #[inline(always)]
    fn next(tcb: &Tcb) -> Option<TaskId> {
        tcb.nblocked
    }
    #[inline(always)]
    fn set_next(tcb: &mut Tcb, next: Option<TaskId>) {
        tcb.nblocked = next;
    }
}

/// Head of an intrusive task list
pub struct TaskList<L: Link> {
    head: Option<TaskId>,
    _link: PhantomData<L>,
}

impl<L: Link> TaskList<L> {
    pub const fn new() -> Self {
        TaskList {
            head: None,
            _link: PhantomData,
        }
    }

    #[inline]
    pub fn head(&self) -> Option<TaskId> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn clear(&mut self) {
        self.head = None;
    }

    /// Successor of `id` in this list
    #[inline]
    pub fn next_of(&self, tasks: &[Tcb], id: TaskId) -> Option<TaskId> {
        L::next(&tasks[id.index()])
    }

    /// Walk the list front to back
    pub fn iter<'a>(&self, tasks: &'a [Tcb]) -> Iter<'a, L> {
        Iter {
            tasks,
            next: self.head,
            _link: PhantomData,
        }
    }

    pub fn contains(&self, tasks: &[Tcb], id: TaskId) -> bool {
        self.iter(tasks).any(|t| t == id)
    }

    pub fn len(&self, tasks: &[Tcb]) -> usize {
        self.iter(tasks).count()
    }

    /// Insert at the front
    pub fn push_front(&mut self, tasks: &mut [Tcb], id: TaskId) {
        L::set_next(&mut tasks[id.index()], self.head);
        self.head = Some(id);
    }

    /// Append at the back (FIFO order)
    pub fn push_back(&mut self, tasks: &mut [Tcb], id: TaskId) {
        L::set_next(&mut tasks[id.index()], None);
        match self.last(tasks) {
            Some(last) => L::set_next(&mut tasks[last.index()], Some(id)),
            None => self.head = Some(id),
        }
    }

    /// Insert before the first node that `id` precedes.
    ///
    /// `precedes(new, node)` must be strict so that equal keys keep their
    /// insertion order.
    pub fn insert_sorted<F>(&mut self, tasks: &mut [Tcb], id: TaskId, precedes: F)
    where
        F: Fn(&Tcb, &Tcb) -> bool,
    {
        let mut prev: Option<TaskId> = None;
        let mut current = self.head;

        while let Some(cur) = current {
            if precedes(&tasks[id.index()], &tasks[cur.index()]) {
                break;
            }
            prev = current;
            current = L::next(&tasks[cur.index()]);
        }

        L::set_next(&mut tasks[id.index()], current);
        match prev {
            Some(p) => L::set_next(&mut tasks[p.index()], Some(id)),
            None => self.head = Some(id),
        }
    }

    /// Remove and return the first node
    pub fn pop_front(&mut self, tasks: &mut [Tcb]) -> Option<TaskId> {
        let head = self.head?;
        self.head = L::next(&tasks[head.index()]);
        L::set_next(&mut tasks[head.index()], None);
        Some(head)
    }

    /// Unlink `id`, returns false if it was not in the list
    pub fn remove(&mut self, tasks: &mut [Tcb], id: TaskId) -> bool {
        let mut prev: Option<TaskId> = None;
        let mut current = self.head;

        while let Some(cur) = current {
            if cur == id {
                let next = L::next(&tasks[cur.index()]);
                match prev {
                    Some(p) => L::set_next(&mut tasks[p.index()], next),
                    None => self.head = next,
                }
                L::set_next(&mut tasks[cur.index()], None);
                return true;
            }
            prev = current;
            current = L::next(&tasks[cur.index()]);
        }

        false
    }

    fn last(&self, tasks: &[Tcb]) -> Option<TaskId> {
        self.iter(tasks).last()
    }
}

impl<L: Link> Default for TaskList<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the ids of a [`TaskList`]
pub struct Iter<'a, L: Link> {
    tasks: &'a [Tcb],
    next: Option<TaskId>,
    _link: PhantomData<L>,
}

impl<L: Link> Iterator for Iter<'_, L> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let id = self.next?;
        self.next = L::next(&self.tasks[id.index()]);
        Some(id)
    }
}
