//! Time management module
//!
//! Tick arithmetic, task delays and busy waits. Deadlines are absolute tick
//! values compared modulo 2^32, so they stay correct across counter
//! wrap-around as long as no wait exceeds half the counter range. Blocking
//! calls reject longer timeouts with [`check_timeout`].

use crate::config::CFG_TICK_RATE_HZ;
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::port::Port;
use crate::types::{task_flags, OsState, OsTick};

/// Longest timeout a blocking call accepts
pub const OS_TIMEOUT_MAX: OsTick = i32::MAX as OsTick;

/// Reject timeouts the wrapping deadline compare cannot represent
///
/// # Returns
/// * `Err(OsError::Invalid)` - `timeout` is above [`OS_TIMEOUT_MAX`]
#[inline]
pub fn check_timeout(timeout: OsTick) -> OsResult<()> {
    if timeout > OS_TIMEOUT_MAX {
        return Err(OsError::Invalid);
    }
    Ok(())
}

/// Whether `deadline` is at or before `now`
#[inline]
pub fn deadline_elapsed(now: OsTick, deadline: OsTick) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}

/// Whether deadline `a` comes strictly before `b`
#[inline]
pub fn deadline_before(a: OsTick, b: OsTick) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Convert hours, minutes, seconds and milliseconds to ticks
///
/// # Returns
/// * `Err(OsError::Invalid)` - a field is out of range
pub fn hmsm_to_ticks(hours: u16, minutes: u8, seconds: u8, milliseconds: u16) -> OsResult<OsTick> {
    if minutes > 59 || seconds > 59 || milliseconds > 999 {
        return Err(OsError::Invalid);
    }

    let total_ms = (hours as u64) * 3_600_000
        + (minutes as u64) * 60_000
        + (seconds as u64) * 1000
        + (milliseconds as u64);

    let ticks = total_ms * CFG_TICK_RATE_HZ as u64 / 1000;
    OsTick::try_from(ticks).map_err(|_| OsError::Invalid)
}

impl<P: Port> Kernel<P> {
    /// Current tick count
    #[inline]
    pub fn uptime(&self) -> OsTick {
        self.port.uptime()
    }

    /// Block the running task for `ticks` ticks
    ///
    /// # Returns
    /// * `Err(OsError::OsNotRunning)` - scheduler not started
    /// * `Err(OsError::Invalid)` - `ticks` above [`OS_TIMEOUT_MAX`], or
    ///   called from the idle task
    pub fn task_delay(&mut self, ticks: OsTick) -> OsResult<()> {
        if self.state != OsState::Started {
            return Err(OsError::OsNotRunning);
        }
        check_timeout(ticks)?;
        if ticks == 0 {
            return Ok(());
        }
        if self.running == self.idle {
            return Err(OsError::Invalid);
        }

        self.svc_block(ticks, task_flags::NONE);
        Ok(())
    }

    /// Spin for `ticks` ticks without involving the scheduler
    ///
    /// Only allowed before `start`.
    pub fn busy_delay(&mut self, ticks: OsTick) -> OsResult<()> {
        if self.state == OsState::Started {
            return Err(OsError::OsRunning);
        }
        self.port.delay(ticks);
        Ok(())
    }
}
