//! Saved register frame
//!
//! Layout of a suspended task's stack, lowest address first:
//!
//! ```text
//! sp ->  r4 r5 r6 r7 r8 r9 r10 r11 EXC_RETURN     (pushed by the switch handler)
//!        [s16..s31]                               (only for extended frames)
//!        r0 r1 r2 r3 r12 lr pc xpsr [s0..s15 fpscr] (pushed by the hardware)
//! ```
//!
//! A new task gets a basic frame that looks as if it had been interrupted
//! right before the first instruction of its handler.

use crate::svc::SvcReturn;
use crate::error::{OsError, OsResult, OsStatus};
use crate::types::{OsStkElement, OsTaskFn};

/// Stamped into the lowest word of every task stack
pub const STACK_GUARD_WORD: OsStkElement = 0xDEAD_BEEF;

/// Fills unused stack memory
pub const STACK_FILL_WORD: OsStkElement = 0xCCCC_CCCC;

/// Return to thread mode on PSP, basic frame
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Initial xPSR: only the Thumb bit set
pub const XPSR_THUMB: u32 = 0x0100_0000;

/// Words in [`SavedFrame`]
pub const SAVED_FRAME_WORDS: usize = 17;

/// s16-s31, saved by software for tasks that used the FPU
pub const EXTENDED_CONTEXT_WORDS: usize = 16;

/// Smallest stack that fits the guard word, one word of alignment slack and
/// a [`SavedFrame`]
pub const MIN_STACK_WORDS: usize = SAVED_FRAME_WORDS + 2;

/// EXC_RETURN bit that is clear when the hardware stacked FPU state
const EXC_RETURN_STD_FRAME: u32 = 1 << 4;

/// Registers stacked by the hardware on exception entry
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

/// Full frame of a task suspended with a basic hardware frame
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedFrame {
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
    pub exc_return: u32,
    pub basic: BasicFrame,
}

const _: () = assert!(core::mem::size_of::<SavedFrame>() == SAVED_FRAME_WORDS * 4);

/// Seed value for register `reg` of task `index`
#[cfg(feature = "debug-frames")]
#[inline]
fn seed(index: usize, reg: u32) -> u32 {
    1000 * (index as u32 + 1) + reg
}

#[cfg(not(feature = "debug-frames"))]
#[inline]
fn seed(_index: usize, _reg: u32) -> u32 {
    0
}

/// Build the initial frame of a task
///
/// Fills `stack` with [`STACK_FILL_WORD`], puts [`STACK_GUARD_WORD`] in its
/// first word and writes a [`SavedFrame`] below the 8-byte aligned top.
/// Returns the stack pointer to store in the task's TCB.
///
/// # Returns
/// * `Err(OsError::StkSizeInvalid)` - fewer than [`MIN_STACK_WORDS`] words
pub fn init_stack(
    stack: &mut [OsStkElement],
    handler: OsTaskFn,
    param: *mut (),
    trampoline: usize,
    index: usize,
) -> OsResult<*mut OsStkElement> {
    if stack.len() < MIN_STACK_WORDS {
        return Err(OsError::StkSizeInvalid);
    }

    stack.fill(STACK_FILL_WORD);
    stack[0] = STACK_GUARD_WORD;

    // The hardware frame has to start on an 8-byte boundary
    let base = stack.as_ptr() as usize;
    let top = (base + stack.len() * 4) & !7;
    let top_idx = (top - base) / 4;
    let region = &mut stack[top_idx - SAVED_FRAME_WORDS..top_idx];

    let frame = SavedFrame {
        r4: seed(index, 4),
        r5: seed(index, 5),
        r6: seed(index, 6),
        r7: seed(index, 7),
        r8: seed(index, 8),
        r9: seed(index, 9),
        r10: seed(index, 10),
        r11: seed(index, 11),
        exc_return: EXC_RETURN_THREAD_PSP,
        basic: BasicFrame {
            r0: param as usize as u32,
            r1: seed(index, 1),
            r2: seed(index, 2),
            r3: seed(index, 3),
            r12: seed(index, 12),
            lr: trampoline as u32,
            pc: (handler as usize as u32) & !1,
            xpsr: XPSR_THUMB,
        },
    };

    let sp = region.as_mut_ptr();
    // SAFETY: `region` is exactly one `SavedFrame` of u32 words
    unsafe { (sp as *mut SavedFrame).write(frame) };
    Ok(sp)
}

/// Offset in words from a saved SP to the stacked r0
///
/// # Safety
/// `sp` must point at a saved frame.
#[inline]
unsafe fn r0_offset(sp: *const OsStkElement) -> usize {
    let exc_return = unsafe { sp.add(8).read_volatile() };
    if exc_return & EXC_RETURN_STD_FRAME == 0 {
        9 + EXTENDED_CONTEXT_WORDS
    } else {
        9
    }
}

/// Write a service result into the stacked r0/r1 of a suspended task
///
/// # Safety
/// `sp` must point at a complete saved frame of a task that is not running.
pub unsafe fn inject_return(sp: *mut OsStkElement, ret: SvcReturn) {
    unsafe {
        let r0 = sp.add(r0_offset(sp));
        r0.write_volatile(ret.status as u32);
        r0.add(1).write_volatile(ret.value as u32);
    }
}

/// Read the stacked r0/r1 of a suspended task
///
/// # Safety
/// `sp` must point at a complete saved frame.
pub unsafe fn saved_return(sp: *const OsStkElement) -> SvcReturn {
    unsafe {
        let r0 = sp.add(r0_offset(sp));
        SvcReturn {
            status: OsStatus::from_raw(r0.read_volatile()),
            value: r0.add(1).read_volatile() as usize,
        }
    }
}

/// Deepest stack use so far, in words
///
/// Counts from the top down to the lowest word that no longer holds the
/// fill pattern.
pub fn stack_usage(stack: &[OsStkElement]) -> usize {
    let untouched = stack
        .iter()
        .skip(1)
        .take_while(|&&w| w == STACK_FILL_WORD)
        .count();
    stack.len() - 1 - untouched
}
