//! Logging macros
//!
//! Forward to `defmt` when the `defmt` feature is on and compile to
//! nothing otherwise. Also home of the kernel's internal assertion macro.

/// Debug message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}

/// Info message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { defmt::info!($($arg)*) };
}

/// Error message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { defmt::error!($($arg)*) };
}

/// Trace message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}

/// Warning message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

// No-op versions when defmt is disabled
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => {}; }
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => {}; }
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => {}; }
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => {}; }
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => {}; }

/// Halt through the port if a kernel invariant does not hold
macro_rules! os_assert {
    ($kernel:expr, $cond:expr) => {
        if !$cond {
            $crate::error!("assertion failed: {}", stringify!($cond));
            $kernel.fatal($crate::port::FatalKind::Assertion);
        }
    };
}
