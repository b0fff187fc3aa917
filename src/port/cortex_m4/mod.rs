//! Cortex-M4 port implementation
//!
//! SysTick drives the scheduler, PendSV performs the register switch and
//! SVCall is the entry point of every kernel service a task calls. The one
//! kernel instance lives in [`KERNEL`].

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{CFG_CPU_CLOCK_HZ, CFG_TICK_RATE_HZ};
use crate::critical::{critical_section, CsCell};
use crate::error::{OsError, OsResult, OsStatus};
use crate::kernel::Kernel;
use crate::port::{FatalKind, Port};
use crate::svc::{Service, SvcReturn};
use crate::types::{MutexId, OsMsg, OsStkElement, OsTick, QueueId, TaskId};

/// System tick counter, bumped by SysTick
static TICKS: AtomicU32 = AtomicU32::new(0);

/// The kernel instance
pub static KERNEL: CsCell<Kernel<CortexM4>> = CsCell::new(Kernel::new(CortexM4::new()));

/// Cortex-M4 platform
pub struct CortexM4 {
    _private: (),
}

impl CortexM4 {
    pub const fn new() -> Self {
        CortexM4 { _private: () }
    }
}

impl Port for CortexM4 {
    fn platform_setup(&mut self) -> OsResult<()> {
        let mut p = unsafe { cortex_m::Peripherals::steal() };

        // PendSV must never preempt another handler
        unsafe {
            p.SCB.set_priority(SystemHandler::PendSV, 0xFF);
            p.SCB.set_priority(SystemHandler::SysTick, 0x00);
        }

        let reload = CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ;
        if reload == 0 || reload > 0x00FF_FFFF {
            return Err(OsError::Invalid);
        }
        p.SYST.set_reload(reload - 1);
        p.SYST.clear_current();
        p.SYST.set_clock_source(SystClkSource::Core);
        p.SYST.enable_interrupt();
        p.SYST.enable_counter();
        Ok(())
    }

    #[inline]
    fn uptime(&self) -> OsTick {
        TICKS.load(Ordering::Relaxed)
    }

    fn delay(&mut self, ticks: OsTick) {
        let cycles_per_tick = CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ;
        for _ in 0..ticks {
            cortex_m::asm::delay(cycles_per_tick);
        }
    }

    #[inline]
    fn request_switch(&mut self) {
        SCB::set_pendsv();
    }

    fn start_first(&mut self) -> OsResult<()> {
        // A null PSP tells PendSV there is no context to save yet
        unsafe { cortex_m::register::psp::write(0) };
        SCB::set_pendsv();
        Ok(())
    }

    fn exit_trampoline(&self) -> usize {
        task_exit as usize
    }

    fn fatal(&mut self, kind: FatalKind) -> ! {
        crate::error!("halting: {}", kind);
        cortex_m::interrupt::disable();

        #[cfg(feature = "semihosting")]
        cortex_m_semihosting::debug::exit(cortex_m_semihosting::debug::EXIT_FAILURE);

        loop {
            cortex_m::asm::wfi();
        }
    }
}

// ============ Setup-time API ============

/// Run `f` on the kernel with interrupts masked
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel<CortexM4>) -> R) -> R {
    critical_section(|cs| f(KERNEL.get(cs)))
}

/// Start multitasking
///
/// Does not return on success: the first task is entered as soon as
/// interrupts are unmasked again.
pub fn os_start() -> OsResult<()> {
    with_kernel(|k| k.start())?;

    loop {
        cortex_m::asm::wfi();
    }
}

/// Current tick count
#[inline]
pub fn uptime_ticks() -> OsTick {
    TICKS.load(Ordering::Relaxed)
}

// ============ Exception handlers ============

/// SysTick interrupt handler
#[no_mangle]
pub extern "C" fn SysTick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    with_kernel(|k| k.tick());
}

/// Called from PendSV with the outgoing task's saved SP
/// Returns new task's stack pointer
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(saved_sp: *mut OsStkElement) -> *mut OsStkElement {
    // SAFETY: PendSV passes either null or the frame it just pushed
    with_kernel(|k| unsafe { k.switch_context(saved_sp) })
}

/// PendSV exception handler - performs full context switch
///
/// 1. Save R4-R11, EXC_RETURN (and S16-S31 if the task used the FPU) to
///    the outgoing task's PSP, skipped before the first task
/// 2. Let the kernel pick the incoming task's SP
/// 3. Restore the incoming task's registers and return to it
#[cfg(not(feature = "fpu"))]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "cbz r0, 1f",
        "stmdb r0!, {{r4-r11, lr}}",
        "1:",
        "bl {switch}",
        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",
        "isb",
        "bx lr",
        switch = sym pendsv_switch_context,
    );
}

#[cfg(feature = "fpu")]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "cbz r0, 1f",
        "tst lr, #0x10",
        "it eq",
        "vstmdbeq r0!, {{s16-s31}}",
        "stmdb r0!, {{r4-r11, lr}}",
        "1:",
        "bl {switch}",
        "ldmia r0!, {{r4-r11, lr}}",
        "tst lr, #0x10",
        "it eq",
        "vldmiaeq r0!, {{s16-s31}}",
        "msr psp, r0",
        "isb",
        "bx lr",
        switch = sym pendsv_switch_context,
    );
}

/// SVCall exception handler
///
/// The caller's stacked frame carries the service number in r12 and its
/// arguments in r0-r2.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "mrs r0, psp",
        "b {entry}",
        entry = sym svc_entry,
    );
}

unsafe extern "C" fn svc_entry(frame: *mut u32) {
    // SAFETY: `frame` is the hardware frame the caller just stacked
    let (svc, args) = unsafe {
        (
            frame.add(4).read(),
            [
                frame.read() as usize,
                frame.add(1).read() as usize,
                frame.add(2).read() as usize,
            ],
        )
    };

    let ret = with_kernel(|k| k.service_call(svc, args));

    unsafe {
        frame.write(ret.status as u32);
        frame.add(1).write(ret.value as u32);
    }
}

/// Where a task lands if its handler returns
extern "C" fn task_exit() {
    service(Service::TaskFinished, [0; 3]);
    loop {
        cortex_m::asm::wfi();
    }
}

// ============ Task-side API ============

/// Issue a service call from task context
#[inline(always)]
pub fn service(svc: Service, args: [usize; 3]) -> SvcReturn {
    let status: u32;
    let value: u32;
    unsafe {
        asm!(
            "svc 0",
            inout("r0") args[0] as u32 => status,
            inout("r1") args[1] as u32 => value,
            in("r2") args[2] as u32,
            in("r12") svc as u32,
        );
    }
    SvcReturn {
        status: OsStatus::from_raw(status),
        value: value as usize,
    }
}

/// Block the calling task for `ticks` ticks
pub fn os_delay(ticks: OsTick) -> OsResult<()> {
    service(Service::Delay, [ticks as usize, 0, 0]).into_result().map(|_| ())
}

pub fn os_mutex_create() -> OsResult<MutexId> {
    service(Service::MutexCreate, [0; 3])
        .into_result()
        .map(|v| MutexId(v as u8))
}

/// Acquire a mutex, waiting at most `timeout` ticks
pub fn os_mutex_acquire(mutex: MutexId, timeout: OsTick) -> OsResult<()> {
    service(Service::MutexAcquire, [mutex.index(), timeout as usize, 0])
        .into_result()
        .map(|_| ())
}

pub fn os_mutex_release(mutex: MutexId) -> OsResult<()> {
    service(Service::MutexRelease, [mutex.index(), 0, 0])
        .into_result()
        .map(|_| ())
}

pub fn os_queue_create(capacity: usize) -> OsResult<QueueId> {
    service(Service::QueueCreate, [capacity, 0, 0])
        .into_result()
        .map(|v| QueueId(v as u8))
}

/// Send `msg`, waiting at most `timeout` ticks for room
pub fn os_queue_enqueue(queue: QueueId, msg: OsMsg, timeout: OsTick) -> OsResult<()> {
    service(
        Service::QueueEnqueue,
        [queue.index(), msg as usize, timeout as usize],
    )
    .into_result()
    .map(|_| ())
}

/// Receive a message, waiting at most `timeout` ticks
pub fn os_queue_dequeue(queue: QueueId, timeout: OsTick) -> OsResult<OsMsg> {
    service(Service::QueueDequeue, [queue.index(), timeout as usize, 0])
        .into_result()
        .map(|v| v as OsMsg)
}

pub fn os_task_suspend(task: TaskId) -> OsResult<()> {
    service(Service::TaskSuspend, [task.index(), 0, 0])
        .into_result()
        .map(|_| ())
}

pub fn os_task_resume(task: TaskId) -> OsResult<()> {
    service(Service::TaskResume, [task.index(), 0, 0])
        .into_result()
        .map(|_| ())
}

pub fn os_task_self() -> Option<TaskId> {
    service(Service::TaskSelf, [0; 3])
        .into_result()
        .ok()
        .map(|v| TaskId(v as u8))
}
