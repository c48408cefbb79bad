//! Crate-internal diagnostics.
//!
//! No logging facade: like the teacher crate (and the original's
//! `U_WARNING`/`U_ERROR` macros, which just `fprintf` to stderr), this
//! writes directly to stderr. Used only for best-effort cleanup and
//! self-healing paths where a failure isn't itself returned as an `Error`
//! but is still worth surfacing.

macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!("[unisys] warning: {}", format_args!($($arg)*));
    };
}

macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!("[unisys] error: {}", format_args!($($arg)*));
    };
}

pub(crate) use log_error;
pub(crate) use log_warn;
