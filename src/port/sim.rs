//! Host simulation port
//!
//! Lets the scheduler run on a development machine. Time only moves when
//! [`SimPort::advance`] is called, switch requests are counted instead of
//! triggering an exception, and fatal errors panic so tests can catch them.

use crate::error::OsResult;
use crate::port::{FatalKind, Port};
use crate::types::OsTick;

/// Simulated platform
#[derive(Debug, Default)]
pub struct SimPort {
    now: OsTick,
    switch_requests: u32,
    setup_calls: u32,
    started: bool,
}

impl SimPort {
    pub const fn new() -> Self {
        SimPort {
            now: 0,
            switch_requests: 0,
            setup_calls: 0,
            started: false,
        }
    }

    /// Move the clock forward
    pub fn advance(&mut self, ticks: OsTick) {
        self.now = self.now.wrapping_add(ticks);
    }

    /// Set the clock, e.g. close to wrap-around
    pub fn set_uptime(&mut self, now: OsTick) {
        self.now = now;
    }

    /// Number of `request_switch` calls so far
    pub fn switch_requests(&self) -> u32 {
        self.switch_requests
    }

    pub fn setup_calls(&self) -> u32 {
        self.setup_calls
    }

    pub fn started(&self) -> bool {
        self.started
    }
}

extern "C" fn sim_task_exit() {}

impl Port for SimPort {
    fn platform_setup(&mut self) -> OsResult<()> {
        self.setup_calls += 1;
        Ok(())
    }

    fn uptime(&self) -> OsTick {
        self.now
    }

    fn delay(&mut self, ticks: OsTick) {
        self.advance(ticks);
    }

    fn request_switch(&mut self) {
        self.switch_requests += 1;
    }

    fn start_first(&mut self) -> OsResult<()> {
        self.started = true;
        Ok(())
    }

    fn exit_trampoline(&self) -> usize {
        sim_task_exit as usize
    }

    fn fatal(&mut self, kind: FatalKind) -> ! {
        panic!("fatal: {:?}", kind)
    }
}
