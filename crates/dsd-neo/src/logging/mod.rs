// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compile-time configurable logging.
//!
//! Four severity macros are exported crate-wide:
//! - `debug!()` - per-frame and per-burst detail
//! - `info!()` - call lifecycle and tuning activity
//! - `warn!()` - policy refusals, deferred releases, degraded inputs
//! - `error!()` - resource failures
//!
//! With the `logging` cargo feature disabled every macro expands to an empty
//! expression, so the symbol-rate hot path pays nothing. The feature is on
//! by default; monitor builds that only want the event stream can opt out.
//!
//! ```ignore
//! use dsd_neo::logging::{init_logger, ConsoleOutput, LogLevel};
//! use std::sync::Arc;
//!
//! init_logger(Arc::new(ConsoleOutput::new()), LogLevel::from_verbosity(1));
//!
//! info!("tuned VC {} Hz for TG {}", freq, tg);
//! warn!("Group Grant blocked by data svc policy");
//! ```

#[cfg(feature = "logging")]
pub mod logger;
#[cfg(feature = "logging")]
mod output;

#[cfg(feature = "logging")]
pub use output::{ConsoleOutput, FileOutput, LogLevel, Output};

#[cfg(feature = "logging")]
pub use logger::{flush_logger, init_logger};

/// Debug-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! debug {
    ($($arg:tt)*) => {
        {
            let _ = $crate::logging::logger::log_message(
                $crate::logging::LogLevel::Debug,
                &format!($($arg)*),
            );
        }
    };
}

/// Info-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! info {
    ($($arg:tt)*) => {
        {
            let _ = $crate::logging::logger::log_message(
                $crate::logging::LogLevel::Info,
                &format!($($arg)*),
            );
        }
    };
}

/// Warning-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! warn {
    ($($arg:tt)*) => {
        {
            let _ = $crate::logging::logger::log_message(
                $crate::logging::LogLevel::Warning,
                &format!($($arg)*),
            );
        }
    };
}

/// Error-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! error {
    ($($arg:tt)*) => {
        {
            let _ = $crate::logging::logger::log_message(
                $crate::logging::LogLevel::Error,
                &format!($($arg)*),
            );
        }
    };
}

/// Function entry trace marker, active with both `logging` and `trace`.
#[macro_export]
#[cfg(all(feature = "logging", feature = "trace"))]
macro_rules! trace_fn {
    ($fn_name:expr) => {
        {
            let _ = $crate::logging::logger::trace_entry($fn_name);
        }
    };
}

/// No-op trace macro (when trace feature disabled).
#[macro_export]
#[cfg(not(all(feature = "logging", feature = "trace")))]
macro_rules! trace_fn {
    ($fn_name:expr) => {};
}

/// No-op debug macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

/// No-op info macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}

/// No-op warn macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

/// No-op error macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
