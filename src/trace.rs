//! Feature-gated, zero-cost-when-off tracing of the middle and back end
//! passes. Mirrors the teacher's paired `#[cfg(feature = ...)]` /
//! `#[cfg(not(feature = ...))]` macro_rules pattern in
//! `compiler_dev_logging.rs` rather than a runtime log-level check.

#[cfg(feature = "trace-kir")]
macro_rules! kir_log {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[cfg(not(feature = "trace-kir"))]
macro_rules! kir_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}

#[cfg(feature = "trace-ssa")]
macro_rules! ssa_log {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[cfg(not(feature = "trace-ssa"))]
macro_rules! ssa_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}

#[cfg(feature = "trace-timers")]
macro_rules! timer {
    ($time:expr, $msg:expr) => {
        saying::say!($msg, Green #$time.elapsed());
    };
}

#[cfg(not(feature = "trace-timers"))]
macro_rules! timer {
    ($time:expr, $msg:expr) => {
        let _ = $time;
    };
}

pub(crate) use kir_log;
pub(crate) use ssa_log;
pub(crate) use timer;
