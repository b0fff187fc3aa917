//! Synchronization primitives
//!
//! Mutexes and bounded queues, both built on the blocking protocol in
//! [`crate::svc`].

pub mod mutex;
pub mod queue;

pub use mutex::OsMutex;
pub use queue::OsQueue;
