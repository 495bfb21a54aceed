//! Log-stream plumbing.
//!
//! A node has no UI; its only operational output is a line-oriented log:
//! `TXU`/`TXB`/`RXU` packet traces, `TREE:` adoption lines, the periodic
//! `STAT:` counter summary, and drop diagnostics from the dispatcher and
//! pool. Everything goes through the thin level macros below so that the
//! `log` crate stays an optional dependency: with the `log` feature enabled
//! they forward to the `log` macros of the same name, without it the
//! arguments are still type-checked but nothing is emitted.

/// Faults the node survives but an operator must see, like a double free
/// in the packet pool.
#[cfg(feature = "log")]
macro_rules! error {
    ($($t:tt)*) => {{ log::error!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

/// Controller-driven disruptions, like a requested reboot.
#[cfg(feature = "log")]
macro_rules! warn {
    ($($t:tt)*) => {{ log::warn!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

/// The operational lines the mesh is monitored by: `RXU`/`TXU` traffic,
/// tree adoptions, rule-request upcalls, the statistics summary.
#[cfg(feature = "log")]
macro_rules! info {
    ($($t:tt)*) => {{ log::info!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

/// Dispatcher decisions worth keeping around a bug report: dropped frames,
/// rule installs, queue overflow.
#[cfg(feature = "log")]
macro_rules! debug {
    ($($t:tt)*) => {{ log::debug!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

/// Per-frame firehose: every transmitted packet, rule expiry, neighbor
/// eviction.
#[cfg(feature = "log")]
macro_rules! trace {
    ($($t:tt)*) => {{ log::trace!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}
