//! Logging abstraction layer.
//!
//! The routing core never talks to a logging backend directly. Every event
//! goes through the macros below, which forward to [`log`](https://docs.rs/log)
//! or [`tracing`](https://docs.rs/tracing) depending on the enabled feature.
//! All events use the `waymark` target so hosts can filter them as a group.
//!
//! | Feature    | Backend         | Default |
//! |------------|-----------------|---------|
//! | `log`      | `log` crate     | yes     |
//! | `tracing`  | `tracing` crate | no      |
//!
//! With neither feature enabled the macros still type-check their arguments
//! but emit nothing.
//!
//! | Macro        | Used for                                                   |
//! |--------------|------------------------------------------------------------|
//! | `trace_log!` | pattern compilation, match attempts, cache hits and misses |
//! | `debug_log!` | navigation phase transitions, guard registration           |
//! | `info_log!`  | committed navigations                                      |
//! | `warn_log!`  | protocol oddities that do not abort anything               |
//! | `error_log!` | guard failures, redirect loops, failed boot navigation     |
//!
//! ```ignore
//! use waymark::{debug_log, warn_log};
//!
//! debug_log!("navigation #{} entering {:?}", id, state);
//! warn_log!("guard at index {} did not call next()", index);
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __waymark_log {
    ($level:ident, $($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        ::tracing::$level!(target: "waymark", $($arg)*);
        #[cfg(feature = "log")]
        ::log::$level!(target: "waymark", $($arg)*);
        #[cfg(not(any(feature = "log", feature = "tracing")))]
        {
            let _ = ::std::format_args!($($arg)*);
        }
    }};
}

/// Emit a **trace**-level event on the `waymark` target.
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        $crate::__waymark_log!(trace, $($arg)*)
    };
}

/// Emit a **debug**-level event on the `waymark` target.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::__waymark_log!(debug, $($arg)*)
    };
}

/// Emit an **info**-level event on the `waymark` target.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        $crate::__waymark_log!(info, $($arg)*)
    };
}

/// Emit a **warn**-level event on the `waymark` target.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::__waymark_log!(warn, $($arg)*)
    };
}

/// Emit an **error**-level event on the `waymark` target.
#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        $crate::__waymark_log!(error, $($arg)*)
    };
}
