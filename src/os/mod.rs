//! Core kernel modules
//!
//! Kernel state, scheduler, task control, service calls and time.

pub mod config;
pub mod critical;
pub mod error;
pub mod kernel;
pub mod types;
pub mod task;
pub mod sched;
pub mod svc;
pub mod time;
