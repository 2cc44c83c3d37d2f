//! Feature-gated tracing at the engine seams (roll, rewrite-at-tail,
//! out-of-space). Compiled to nothing unless the `log` cargo feature is on,
//! matching `thalesfragoso-keykey`'s `loggy.rs`: the format string is still
//! type-checked in the default build via `format_args!`, just never emitted.

#[cfg(feature = "log")]
macro_rules! vs_log {
    ($($t:tt)*) => {{ rtt_target::rprintln!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! vs_log {
    ($($t:tt)*) => {{
        let _ = core::format_args!($($t)*);
    }};
}

pub(crate) use vs_log;
