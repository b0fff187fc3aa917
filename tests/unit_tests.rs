//! Scheduler tests on the simulated port
//!
//! These tests run on the host (not embedded target). Each test owns its
//! own `Kernel<SimPort>`; a "task call" is simply a kernel call made while
//! that task is the running one, and `complete_switch` stands in for
//! PendSV.

use osdoth::port::frame;
use osdoth::port::sim::SimPort;
use osdoth::svc::{Service, SvcReturn};
use osdoth::time::OS_TIMEOUT_MAX;
use osdoth::{
    Kernel, OsError, OsMsg, Port, OsPrio, OsState, OsStatus, OsStkElement, QueueStatus, TaskId,
    TaskStart, TaskStatus, CFG_STK_SIZE_MIN, CFG_TASKS_MAX, OS_PRIORITY_IDLE,
};

extern "C" fn task_fn(_: *mut ()) {}

fn stack() -> &'static mut [OsStkElement] {
    Box::leak(Box::new([0; 128]))
}

fn kernel() -> Kernel<SimPort> {
    let mut k = Kernel::new(SimPort::new());
    k.initialize().unwrap();
    k
}

fn spawn_with(k: &mut Kernel<SimPort>, name: &'static str, prio: OsPrio, param: usize) -> TaskId {
    k.register_task_with_priority(
        name,
        TaskStart::Running,
        task_fn,
        param as *mut (),
        stack(),
        prio,
    )
    .unwrap()
}

fn spawn(k: &mut Kernel<SimPort>, name: &'static str, prio: OsPrio) -> TaskId {
    spawn_with(k, name, prio, 0)
}

/// idle + two equal-priority tasks, started; `a` is running
fn two_tasks() -> (Kernel<SimPort>, TaskId, TaskId) {
    let mut k = kernel();
    spawn(&mut k, "idle", 0);
    let a = spawn_with(&mut k, "a", 16, 0x11);
    let b = spawn_with(&mut k, "b", 16, 0x55);
    k.start().unwrap();
    assert_eq!(k.task_self(), Some(a));
    (k, a, b)
}

/// idle + three equal-priority tasks, started; `a` is running
fn three_tasks() -> (Kernel<SimPort>, TaskId, TaskId, TaskId) {
    let mut k = kernel();
    spawn(&mut k, "idle", 0);
    let a = spawn(&mut k, "a", 16);
    let b = spawn(&mut k, "b", 16);
    let c = spawn(&mut k, "c", 16);
    k.start().unwrap();
    assert_eq!(k.task_self(), Some(a));
    (k, a, b, c)
}

/// One tick: advance the clock, schedule, then let the switch happen
fn tick(k: &mut Kernel<SimPort>) {
    k.port_mut().advance(1);
    k.tick();
    k.complete_switch();
}

fn saved_return(k: &Kernel<SimPort>, id: TaskId) -> SvcReturn {
    unsafe { frame::saved_return(k.task(id).unwrap().stk_ptr) }
}

fn msg(v: usize) -> OsMsg {
    v as OsMsg
}

#[cfg(test)]
mod registration_tests {
    use super::*;

    #[test]
    fn test_runqueue_sorted_fifo() {
        let mut k = kernel();
        let idle = spawn(&mut k, "idle", 0);
        let a = spawn(&mut k, "a", 16);
        let b = spawn(&mut k, "b", 32);
        let c = spawn(&mut k, "c", 16);
        let d = spawn(&mut k, "d", 32);
        let e = spawn(&mut k, "e", 1);

        let order: Vec<TaskId> = k.runqueue().collect();
        assert_eq!(order, [b, d, a, c, e, idle]);

        let prios: Vec<OsPrio> = order.iter().map(|&t| k.task(t).unwrap().priority).collect();
        assert!(prios.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_idle_is_first_and_lowest() {
        let mut k = kernel();
        let idle = spawn(&mut k, "idle", 0x80);
        let a = spawn(&mut k, "a", 1);

        assert_eq!(k.idle_task(), Some(idle));
        assert_eq!(k.task(idle).unwrap().priority, OS_PRIORITY_IDLE);
        assert_eq!(k.runqueue().last(), Some(idle));
        assert_eq!(k.runqueue().next(), Some(a));
    }

    #[test]
    fn test_idle_must_start_running() {
        let mut k = kernel();
        let r = k.register_task("idle", TaskStart::Suspended, task_fn, core::ptr::null_mut(), stack());
        assert_eq!(r, Err(OsError::IdleNotRunning));
        assert_eq!(k.state(), OsState::Initialized);
    }

    #[test]
    fn test_suspended_registration_stays_out_of_runqueue() {
        let mut k = kernel();
        let idle = spawn(&mut k, "idle", 0);
        let s = k
            .register_task("s", TaskStart::Suspended, task_fn, core::ptr::null_mut(), stack())
            .unwrap();

        assert_eq!(k.task_status(s), Some(TaskStatus::Suspended));
        assert_eq!(k.runqueue().collect::<Vec<_>>(), [idle]);
        assert_eq!(k.task(s).unwrap().priority, osdoth::OS_PRIORITY_NORMAL);
    }

    #[test]
    fn test_all_tasks_newest_first() {
        let mut k = kernel();
        let idle = spawn(&mut k, "idle", 0);
        let a = spawn(&mut k, "a", 5);
        let b = spawn(&mut k, "b", 9);
        assert_eq!(k.tasks().collect::<Vec<_>>(), [b, a, idle]);
        assert_eq!(k.task_count(), 3);
        assert_eq!(k.task_name(a), Some("a"));
    }

    #[test]
    fn test_state_errors() {
        let mut k = Kernel::new(SimPort::new());
        let r = k.register_task("idle", TaskStart::Running, task_fn, core::ptr::null_mut(), stack());
        assert_eq!(r, Err(OsError::OsNotInit));
        assert_eq!(k.start(), Err(OsError::OsNotInit));

        k.initialize().unwrap();
        assert_eq!(k.initialize(), Err(OsError::OsRunning));
        assert_eq!(k.start(), Err(OsError::OsNoTask));

        spawn(&mut k, "idle", 0);
        k.start().unwrap();
        assert_eq!(k.start(), Err(OsError::OsRunning));

        let r = k.register_task("late", TaskStart::Running, task_fn, core::ptr::null_mut(), stack());
        assert_eq!(r, Err(OsError::OsRunning));
    }

    #[test]
    fn test_stack_too_small() {
        let mut k = kernel();
        let small: &'static mut [OsStkElement] = Box::leak(vec![0; CFG_STK_SIZE_MIN - 1].into_boxed_slice());
        let r = k.register_task("idle", TaskStart::Running, task_fn, core::ptr::null_mut(), small);
        assert_eq!(r, Err(OsError::StkSizeInvalid));
        assert_eq!(k.task_count(), 0);
    }

    #[test]
    fn test_task_table_full() {
        let mut k = kernel();
        for _ in 0..CFG_TASKS_MAX {
            spawn(&mut k, "t", 1);
        }
        let r = k.register_task("extra", TaskStart::Running, task_fn, core::ptr::null_mut(), stack());
        assert_eq!(r, Err(OsError::TaskNoMoreTcb));
    }

    #[test]
    fn test_initial_frame() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        let a = spawn_with(&mut k, "a", 3, 0x4242);

        let tcb = k.task(a).unwrap();
        assert_eq!(tcb.guard_word(), frame::STACK_GUARD_WORD);
        let saved = unsafe { (tcb.stk_ptr as *const frame::SavedFrame).read() };
        assert_eq!(saved.basic.r0, 0x4242);
        assert_eq!(saved.basic.xpsr, frame::XPSR_THUMB);
        assert_eq!(saved.exc_return, frame::EXC_RETURN_THREAD_PSP);
        assert_eq!(saved.basic.lr, k.port().exit_trampoline() as u32);
    }

    #[test]
    fn test_teardown_resets() {
        let (mut k, _, _) = two_tasks();
        k.mutex_create().unwrap();
        k.teardown();

        assert_eq!(k.state(), OsState::Default);
        assert_eq!(k.task_count(), 0);
        assert_eq!(k.task_self(), None);
        assert_eq!(k.runqueue().count(), 0);

        k.initialize().unwrap();
        let idle = spawn(&mut k, "idle", 7);
        assert_eq!(k.idle_task(), Some(idle));
        assert_eq!(k.mutex_create().map(|m| m.index()), Ok(0));
    }
}

#[cfg(test)]
mod sched_tests {
    use super::*;

    #[test]
    fn test_start_runs_highest_priority() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        spawn(&mut k, "low", 4);
        let high = spawn(&mut k, "high", 40);
        k.start().unwrap();

        assert_eq!(k.state(), OsState::Started);
        assert!(k.port().started());
        assert_eq!(k.port().setup_calls(), 1);
        assert_eq!(k.task_self(), Some(high));
        assert_eq!(k.scheduled(), None);

        let active: Vec<TaskId> = k
            .tasks()
            .filter(|&t| k.task_status(t) == Some(TaskStatus::Active))
            .collect();
        assert_eq!(active, [high]);
    }

    #[test]
    fn test_round_robin_equal_priority() {
        let (mut k, a, b) = two_tasks();

        let mut seen = Vec::new();
        for _ in 0..6 {
            tick(&mut k);
            seen.push(k.task_self().unwrap());
        }
        assert_eq!(seen, [b, a, b, a, b, a]);
    }

    #[test]
    fn test_lower_priority_never_preempts() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        let high = spawn(&mut k, "high", 20);
        spawn(&mut k, "low", 10);
        k.start().unwrap();

        for _ in 0..5 {
            tick(&mut k);
            assert_eq!(k.task_self(), Some(high));
        }
        assert_eq!(k.port().switch_requests(), 0);
    }

    #[test]
    fn test_resumed_higher_priority_preempts() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        let a = spawn(&mut k, "a", 16);
        let h = k
            .register_task_with_priority("h", TaskStart::Suspended, task_fn, core::ptr::null_mut(), stack(), 32)
            .unwrap();
        k.start().unwrap();
        assert_eq!(k.task_self(), Some(a));

        k.task_resume(h).unwrap();
        assert_eq!(k.task_status(h), Some(TaskStatus::Idle));
        tick(&mut k);
        assert_eq!(k.task_self(), Some(h));
        tick(&mut k);
        assert_eq!(k.task_self(), Some(h));
    }

    #[test]
    fn test_no_switch_while_pending() {
        let (mut k, _, b) = two_tasks();
        k.port_mut().advance(1);
        k.tick();
        assert_eq!(k.scheduled(), Some(b));
        assert_eq!(k.port().switch_requests(), 1);

        // A second decision before the switch happened changes nothing
        k.tick();
        assert_eq!(k.scheduled(), Some(b));
        assert_eq!(k.port().switch_requests(), 1);

        assert!(k.complete_switch());
        assert!(!k.complete_switch());
        assert_eq!(k.task_self(), Some(b));
    }

    #[test]
    fn test_delay_wakes_on_deadline() {
        let mut k = kernel();
        let idle = spawn(&mut k, "idle", 0);
        let a = spawn(&mut k, "a", 16);
        k.start().unwrap();

        assert_eq!(k.task_delay(10), Ok(()));
        assert_eq!(k.task_status(a), Some(TaskStatus::Wait));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(idle));
        assert_eq!(k.waitqueue().collect::<Vec<_>>(), [a]);

        for _ in 0..9 {
            tick(&mut k);
            assert_eq!(k.task_self(), Some(idle));
            assert_eq!(k.task_status(a), Some(TaskStatus::Wait));
        }

        tick(&mut k);
        assert_eq!(k.uptime(), 10);
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(k.task_status(idle), Some(TaskStatus::Idle));
        assert_eq!(k.waitqueue().count(), 0);
    }

    #[test]
    fn test_delay_zero_returns_immediately() {
        let (mut k, a, _) = two_tasks();
        assert_eq!(k.task_delay(0), Ok(()));
        assert_eq!(k.task_status(a), Some(TaskStatus::Active));
        assert_eq!(k.scheduled(), None);
    }

    #[test]
    fn test_delay_across_tick_wraparound() {
        let mut k = kernel();
        let idle = spawn(&mut k, "idle", 0);
        let a = spawn(&mut k, "a", 16);
        k.port_mut().set_uptime(u32::MAX - 2);
        k.start().unwrap();

        k.task_delay(5).unwrap();
        k.complete_switch();

        for _ in 0..4 {
            tick(&mut k);
            assert_eq!(k.task_self(), Some(idle));
        }
        tick(&mut k);
        assert_eq!(k.uptime(), 2);
        assert_eq!(k.task_self(), Some(a));
    }

    #[test]
    fn test_waitqueue_sorted_by_deadline() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        let a = spawn(&mut k, "a", 30);
        let b = spawn(&mut k, "b", 20);
        let c = spawn(&mut k, "c", 10);
        k.start().unwrap();

        k.task_delay(50).unwrap();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        k.task_delay(10).unwrap();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(c));
        k.task_delay(30).unwrap();
        k.complete_switch();

        assert_eq!(k.waitqueue().collect::<Vec<_>>(), [b, c, a]);
    }

    #[test]
    fn test_expired_wait_beats_priority() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        let low = spawn(&mut k, "low", 5);
        let high = spawn(&mut k, "high", 50);
        k.start().unwrap();
        assert_eq!(k.task_self(), Some(high));

        // Park `high`, let `low` block briefly, then bring `high` back
        k.task_delay(1).unwrap();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(low));
        k.task_delay(2).unwrap();
        k.complete_switch();
        tick(&mut k);
        assert_eq!(k.task_self(), Some(high));

        // `low` is due now and gets the CPU despite its priority
        tick(&mut k);
        assert_eq!(k.task_self(), Some(low));
    }

    #[test]
    #[should_panic(expected = "StackOverflow")]
    fn test_stack_guard_corruption_is_fatal() {
        let (mut k, a, _) = two_tasks();
        unsafe { k.task(a).unwrap().stk_base.write(0) };
        k.tick();
    }

    #[test]
    #[should_panic(expected = "StackOverflow")]
    fn test_corrupted_guard_caught_before_switch_in() {
        let (mut k, _, b) = two_tasks();
        unsafe { k.task(b).unwrap().stk_base.write(0) };
        // `b` is next in line; switching into it must not happen
        k.port_mut().advance(1);
        k.tick();
    }

    #[test]
    fn test_timeout_beyond_half_range_rejected() {
        let (mut k, a, b) = two_tasks();
        let q = k.queue_create(1).unwrap();
        let m = k.mutex_create().unwrap();

        assert_eq!(k.task_delay(u32::MAX), Err(OsError::Invalid));
        assert_eq!(k.queue_dequeue(q, u32::MAX), Err(OsError::Invalid));
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));
        assert_eq!(k.mutex_acquire(m, OS_TIMEOUT_MAX + 1), Err(OsError::Invalid));
        assert_eq!(k.mutex_owner(m), None);
        assert_eq!(k.task_status(a), Some(TaskStatus::Active));
        assert_eq!(k.scheduled(), None);

        // The longest accepted wait really waits
        k.task_delay(OS_TIMEOUT_MAX).unwrap();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        for _ in 0..10 {
            tick(&mut k);
            assert_eq!(k.task_status(a), Some(TaskStatus::Wait));
        }
        assert_eq!(k.waitqueue().collect::<Vec<_>>(), [a]);
    }

    #[test]
    fn test_busy_delay_before_start_only() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        k.busy_delay(25).unwrap();
        assert_eq!(k.uptime(), 25);
        k.start().unwrap();
        assert_eq!(k.busy_delay(1), Err(OsError::OsRunning));
    }
}

#[cfg(test)]
mod task_control_tests {
    use super::*;

    #[test]
    fn test_suspend_and_resume() {
        let (mut k, a, b) = two_tasks();

        k.task_suspend(b).unwrap();
        assert_eq!(k.task_status(b), Some(TaskStatus::Suspended));
        assert!(!k.runqueue().any(|t| t == b));
        for _ in 0..3 {
            tick(&mut k);
            assert_eq!(k.task_self(), Some(a));
        }

        assert_eq!(k.task_suspend(b), Err(OsError::TaskNotSuspendable));
        k.task_resume(b).unwrap();
        assert_eq!(k.task_resume(b), Err(OsError::TaskNotSuspended));
        tick(&mut k);
        assert_eq!(k.task_self(), Some(b));
    }

    #[test]
    fn test_suspend_self_switches_away() {
        let (mut k, a, b) = two_tasks();
        k.task_suspend(a).unwrap();
        assert_eq!(k.scheduled(), Some(b));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        assert_eq!(k.task_status(a), Some(TaskStatus::Suspended));
        assert!(!k.runqueue().any(|t| t == a));
    }

    #[test]
    fn test_idle_cannot_be_suspended() {
        let (mut k, _, _) = two_tasks();
        let idle = k.idle_task().unwrap();
        assert_eq!(k.task_suspend(idle), Err(OsError::TaskSuspendIdle));
    }

    #[test]
    fn test_suspend_waiting_task() {
        let (mut k, a, b) = two_tasks();
        k.task_delay(20).unwrap();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));

        k.task_suspend(a).unwrap();
        assert_eq!(k.waitqueue().count(), 0);
        for _ in 0..25 {
            tick(&mut k);
        }
        assert_eq!(k.task_status(a), Some(TaskStatus::Suspended));

        k.task_resume(a).unwrap();
        tick(&mut k);
        assert_eq!(k.task_self(), Some(a));
    }

    #[test]
    fn test_finished_task_leaves_runqueue() {
        let (mut k, a, b) = two_tasks();
        k.task_finished();
        k.complete_switch();

        assert_eq!(k.task_status(a), Some(TaskStatus::Finished));
        assert_eq!(k.task_self(), Some(b));
        assert!(!k.runqueue().any(|t| t == a));
        assert_eq!(k.task_suspend(a), Err(OsError::TaskNotSuspendable));
        // Still registered
        assert_eq!(k.task_count(), 3);
    }

    #[test]
    fn test_idle_cannot_block() {
        let mut k = kernel();
        let idle = spawn(&mut k, "idle", 0);
        spawn(&mut k, "a", 16);
        k.start().unwrap();

        let m = k.mutex_create().unwrap();
        let q = k.queue_create(1).unwrap();
        k.mutex_acquire(m, 0).unwrap();
        k.task_delay(10).unwrap();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(idle));

        assert_eq!(k.mutex_acquire(m, 5), Err(OsError::Invalid));
        assert_eq!(k.mutex_acquire(m, 0), Err(OsError::Timeout));
        assert_eq!(k.queue_dequeue(q, 5), Err(OsError::Invalid));
        assert_eq!(k.queue_dequeue(q, 0), Err(OsError::QEmpty));
        k.queue_enqueue(q, msg(1), 0).unwrap();
        assert_eq!(k.queue_enqueue(q, msg(2), 5), Err(OsError::Invalid));
        assert_eq!(k.queue_len(q), 1);
        assert_eq!(k.task_delay(3), Err(OsError::Invalid));
        assert_eq!(k.task_delay(0), Ok(()));

        assert_eq!(k.task_status(idle), Some(TaskStatus::Active));
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));
        assert_eq!(k.scheduled(), None);
    }

    #[test]
    #[should_panic(expected = "App")]
    fn test_idle_returning_is_fatal() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        k.start().unwrap();
        k.task_finished();
    }
}

#[cfg(test)]
mod mutex_tests {
    use super::*;

    #[test]
    fn test_reentrant_acquire() {
        let (mut k, a, b) = two_tasks();
        let m = k.mutex_create().unwrap();

        for level in 1..=3 {
            k.mutex_acquire(m, 0).unwrap();
            assert_eq!(k.mutex_level(m), level);
        }
        k.mutex_release(m).unwrap();
        k.mutex_release(m).unwrap();
        assert_eq!(k.mutex_owner(m), Some(a));

        // The other task still sees it taken
        tick(&mut k);
        assert_eq!(k.task_self(), Some(b));
        assert_eq!(k.mutex_acquire(m, 0), Err(OsError::Timeout));
        assert_eq!(k.task_status(b), Some(TaskStatus::Active));

        tick(&mut k);
        k.mutex_release(m).unwrap();
        assert_eq!(k.mutex_owner(m), None);
        assert_eq!(k.mutex_level(m), 0);
    }

    #[test]
    fn test_release_hands_over_to_first_waiter() {
        let mut k = kernel();
        spawn(&mut k, "idle", 0);
        let a = spawn(&mut k, "a", 16);
        let b = spawn_with(&mut k, "b", 16, 0x55);
        let c = spawn_with(&mut k, "c", 16, 0x66);
        k.start().unwrap();
        let m = k.mutex_create().unwrap();
        k.mutex_acquire(m, 0).unwrap();

        // b, then c, queue up behind a
        tick(&mut k);
        assert_eq!(k.task_self(), Some(b));
        assert_eq!(k.mutex_acquire(m, 100), Err(OsError::Timeout));
        assert_eq!(k.task_status(b), Some(TaskStatus::Wait));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(c));
        assert_eq!(k.mutex_acquire(m, 100), Err(OsError::Timeout));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(k.task_status(a), Some(TaskStatus::Active));

        k.mutex_release(m).unwrap();
        assert_eq!(k.mutex_owner(m), Some(b));
        assert_eq!(k.mutex_level(m), 1);
        assert_eq!(k.task(b).unwrap().pending, Some(SvcReturn::SUCCESS));
        assert_eq!(k.scheduled(), Some(b));

        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        assert_eq!(k.task(b).unwrap().pending, None);
        assert_eq!(saved_return(&k, b), SvcReturn::SUCCESS);
        assert_eq!(k.task_status(c), Some(TaskStatus::Wait));

        k.mutex_release(m).unwrap();
        assert_eq!(k.mutex_owner(m), Some(c));
    }

    #[test]
    fn test_waiter_times_out() {
        let (mut k, a, b) = two_tasks();
        let m = k.mutex_create().unwrap();
        k.mutex_acquire(m, 0).unwrap();
        tick(&mut k);

        k.mutex_acquire(m, 5).unwrap_err();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));

        for _ in 0..5 {
            tick(&mut k);
        }
        assert_eq!(k.task_self(), Some(b));
        assert!(!k.task(b).unwrap().is_blocked());
        // The synchronous Timeout stands, nothing was injected
        assert_eq!(k.task(b).unwrap().pending, None);
        let saved = unsafe { (k.task(b).unwrap().stk_ptr as *const frame::SavedFrame).read() };
        assert_eq!(saved.basic.r0, 0x55);

        tick(&mut k);
        k.mutex_release(m).unwrap();
        assert_eq!(k.mutex_owner(m), None);
    }

    #[test]
    #[should_panic(expected = "Assertion")]
    fn test_release_by_non_owner_is_fatal() {
        let (mut k, _, _) = two_tasks();
        let m = k.mutex_create().unwrap();
        k.mutex_acquire(m, 0).unwrap();
        tick(&mut k);
        let _ = k.mutex_release(m);
    }

    #[test]
    #[should_panic(expected = "Assertion")]
    fn test_release_unlocked_is_fatal() {
        let (mut k, _, _) = two_tasks();
        let m = k.mutex_create().unwrap();
        let _ = k.mutex_release(m);
    }

    #[test]
    fn test_mutex_pool_exhausted() {
        let (mut k, _, _) = two_tasks();
        for _ in 0..osdoth::CFG_MUTEX_MAX {
            k.mutex_create().unwrap();
        }
        assert_eq!(k.mutex_create(), Err(OsError::ObjPoolEmpty));
    }

    #[test]
    fn test_suspended_waiter_loses_its_place() {
        let (mut k, _, b) = two_tasks();
        let m = k.mutex_create().unwrap();
        k.mutex_acquire(m, 0).unwrap();
        tick(&mut k);
        k.mutex_acquire(m, 100).unwrap_err();
        k.complete_switch();

        k.task_suspend(b).unwrap();
        assert!(!k.task(b).unwrap().is_blocked());
        k.mutex_release(m).unwrap();
        assert_eq!(k.mutex_owner(m), None);

        k.task_resume(b).unwrap();
        assert_eq!(k.task_status(b), Some(TaskStatus::Idle));
        assert_eq!(k.mutex_owner(m), None);
    }
}

#[cfg(test)]
mod queue_tests {
    use super::*;

    #[test]
    fn test_fifo_then_empty() {
        let (mut k, _, _) = two_tasks();
        let q = k.queue_create(4).unwrap();

        for v in [0xA, 0xB, 0xC] {
            k.queue_enqueue(q, msg(v), 0).unwrap();
        }
        assert_eq!(k.queue_len(q), 3);
        for v in [0xA, 0xB, 0xC] {
            assert_eq!(k.queue_dequeue(q, 0), Ok(msg(v)));
        }

        let err = k.queue_dequeue(q, 0).unwrap_err();
        assert_eq!(err, OsError::QEmpty);
        assert_eq!(err.status(), OsStatus::Mem);
    }

    #[test]
    fn test_full_fails_fast_without_mutation() {
        let (mut k, _, _) = two_tasks();
        let q = k.queue_create(2).unwrap();
        k.queue_enqueue(q, msg(1), 0).unwrap();
        k.queue_enqueue(q, msg(2), 0).unwrap();

        let err = k.queue_enqueue(q, msg(3), 0).unwrap_err();
        assert_eq!(err, OsError::QFull);
        assert_eq!(err.status(), OsStatus::Mem);
        assert_eq!(k.queue_len(q), 2);
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));

        assert_eq!(k.queue_dequeue(q, 0), Ok(msg(1)));
        assert_eq!(k.queue_dequeue(q, 0), Ok(msg(2)));
    }

    #[test]
    fn test_direct_handoff_to_blocked_receiver() {
        let (mut k, a, b) = two_tasks();
        let q = k.queue_create(2).unwrap();

        assert_eq!(k.queue_dequeue(q, 50), Err(OsError::Timeout));
        assert_eq!(k.queue_status(q), Some(QueueStatus::BlockedReceive));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));

        k.queue_enqueue(q, msg(0xABCD), 10).unwrap();
        assert_eq!(k.queue_len(q), 0);
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));

        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(saved_return(&k, a), SvcReturn::ok(0xABCD));
    }

    #[test]
    fn test_blocked_sender_refills_freed_slot() {
        let (mut k, a, b) = two_tasks();
        let q = k.queue_create(1).unwrap();

        k.queue_enqueue(q, msg(1), 0).unwrap();
        assert_eq!(k.queue_enqueue(q, msg(2), 10), Err(OsError::Timeout));
        assert_eq!(k.queue_status(q), Some(QueueStatus::BlockedSend));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));

        assert_eq!(k.queue_dequeue(q, 0), Ok(msg(1)));
        assert_eq!(k.queue_len(q), 1);
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));

        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(saved_return(&k, a), SvcReturn::SUCCESS);
        assert_eq!(k.queue_dequeue(q, 0), Ok(msg(2)));
    }

    #[test]
    fn test_handoff_keeps_full_pointer() {
        let (mut k, a, b) = two_tasks();
        let q = k.queue_create(1).unwrap();
        let payload = Box::into_raw(Box::new(0xFEED_u64));

        k.queue_dequeue(q, 50).unwrap_err();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        k.queue_enqueue(q, payload as OsMsg, 0).unwrap();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));

        let got = k.task(a).unwrap().delivered.unwrap();
        assert_eq!(got, SvcReturn::ok(payload as usize));
        let received = got.value as *mut u64;
        assert_eq!(unsafe { *received }, 0xFEED);
        drop(unsafe { Box::from_raw(received) });
    }

    #[test]
    fn test_blocked_receivers_served_in_order() {
        let (mut k, a, b, c) = three_tasks();
        let q = k.queue_create(2).unwrap();

        k.queue_dequeue(q, 50).unwrap_err();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        k.queue_dequeue(q, 50).unwrap_err();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(c));
        assert_eq!(k.queue_status(q), Some(QueueStatus::BlockedReceive));

        // First message goes to the first receiver, the second one still waits
        k.queue_enqueue(q, msg(0xA1), 0).unwrap();
        assert_eq!(k.queue_status(q), Some(QueueStatus::BlockedReceive));
        assert_eq!(k.task_status(b), Some(TaskStatus::Wait));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(k.task(a).unwrap().delivered, Some(SvcReturn::ok(0xA1)));

        k.queue_enqueue(q, msg(0xB2), 0).unwrap();
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));
        assert_eq!(k.queue_len(q), 0);
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        assert_eq!(k.task(b).unwrap().delivered, Some(SvcReturn::ok(0xB2)));
    }

    #[test]
    fn test_blocked_senders_refill_in_order() {
        let (mut k, a, b, c) = three_tasks();
        let q = k.queue_create(1).unwrap();

        k.queue_enqueue(q, msg(0x10), 0).unwrap();
        k.queue_enqueue(q, msg(0x11), 50).unwrap_err();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        k.queue_enqueue(q, msg(0x12), 50).unwrap_err();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(c));
        assert_eq!(k.queue_status(q), Some(QueueStatus::BlockedSend));

        assert_eq!(k.queue_dequeue(q, 0), Ok(msg(0x10)));
        assert_eq!(k.queue_len(q), 1);
        assert_eq!(k.queue_status(q), Some(QueueStatus::BlockedSend));
        assert_eq!(k.task_status(b), Some(TaskStatus::Wait));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(k.task(a).unwrap().delivered, Some(SvcReturn::SUCCESS));

        assert_eq!(k.queue_dequeue(q, 0), Ok(msg(0x11)));
        assert_eq!(k.queue_len(q), 1);
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));
        assert_eq!(k.task(b).unwrap().delivered, Some(SvcReturn::SUCCESS));

        assert_eq!(k.queue_dequeue(q, 0), Ok(msg(0x12)));
        assert_eq!(k.queue_len(q), 0);
    }

    #[test]
    fn test_receiver_times_out() {
        let (mut k, a, b) = two_tasks();
        let q = k.queue_create(1).unwrap();
        k.queue_dequeue(q, 3).unwrap_err();
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));

        for _ in 0..3 {
            tick(&mut k);
        }
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(k.queue_status(q), Some(QueueStatus::Fine));

        // A later message goes into the ring
        k.queue_enqueue(q, msg(9), 0).unwrap();
        assert_eq!(k.queue_len(q), 1);
    }

    #[test]
    fn test_create_limits() {
        let (mut k, _, _) = two_tasks();
        assert_eq!(k.queue_create(0), Err(OsError::QMax));
        assert_eq!(k.queue_create(osdoth::CFG_QUEUE_SIZE_MAX + 1), Err(OsError::QMax));
        let q = k.queue_create(osdoth::CFG_QUEUE_SIZE_MAX).unwrap();
        assert_eq!(k.queue_capacity(q), osdoth::CFG_QUEUE_SIZE_MAX);
    }
}

#[cfg(test)]
mod svc_tests {
    use super::*;

    #[test]
    fn test_service_call_dispatch() {
        let (mut k, a, _) = two_tasks();

        let r = k.service_call(Service::MutexCreate as u32, [0; 3]);
        assert_eq!(r, SvcReturn::ok(0));
        let r = k.service_call(Service::MutexAcquire as u32, [0, 0, 0]);
        assert_eq!(r, SvcReturn::SUCCESS);
        let r = k.service_call(Service::MutexAcquire as u32, [0, 0, 0]);
        assert_eq!(r, SvcReturn::SUCCESS);
        for _ in 0..2 {
            let r = k.service_call(Service::MutexRelease as u32, [0, 0, 0]);
            assert_eq!(r, SvcReturn::SUCCESS);
        }

        let r = k.service_call(Service::TaskSelf as u32, [0; 3]);
        assert_eq!(r, SvcReturn::ok(a.index()));

        let r = k.service_call(Service::QueueCreate as u32, [0, 0, 0]);
        assert_eq!(r.status, OsStatus::Invalid);

        let r = k.service_call(Service::MutexRelease as u32, [5, 0, 0]);
        assert_eq!(r.status, OsStatus::Invalid);

        let r = k.service_call(0xFF, [0; 3]);
        assert_eq!(r.status, OsStatus::Invalid);
    }

    #[test]
    fn test_service_call_blocking_queue() {
        let (mut k, a, b) = two_tasks();
        let q = k.service_call(Service::QueueCreate as u32, [2, 0, 0]).value;

        let r = k.service_call(Service::QueueDequeue as u32, [q, 5, 0]);
        assert_eq!(r.status, OsStatus::Timeout);
        k.complete_switch();
        assert_eq!(k.task_self(), Some(b));

        let r = k.service_call(Service::QueueEnqueue as u32, [q, 0x77, 0]);
        assert_eq!(r, SvcReturn::SUCCESS);
        k.complete_switch();
        assert_eq!(k.task_self(), Some(a));
        assert_eq!(saved_return(&k, a), SvcReturn::ok(0x77));
    }
}
