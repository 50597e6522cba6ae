// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance and initialization.
//!
//! A thread-safe singleton logger with a runtime level filter. The demod,
//! audio and trunking code all log through the macros in the parent module;
//! an uninitialized logger is a silent no-op so library embedders are never
//! forced to configure output.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, Mutex, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<GlobalLogger>>> = OnceLock::new();

/// Global logger state: the active output and the level filter.
pub struct GlobalLogger {
    output: Option<Arc<dyn Output>>,
    level_filter: LogLevel,
}

impl GlobalLogger {
    fn new() -> Self {
        Self {
            output: None,
            level_filter: LogLevel::Info,
        }
    }

    fn log(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        if let Some(ref output) = self.output {
            output.write(level, message)?;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        if let Some(ref output) = self.output {
            output.flush()?;
        }
        Ok(())
    }
}

/// Initialize the global logger with the given output and minimum level.
///
/// Only the first call takes effect; subsequent calls are ignored. Call this
/// early in startup, before the capture and demod threads spawn.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) {
    let _ = LOGGER.get_or_init(|| {
        let mut logger = GlobalLogger::new();
        logger.output = Some(output);
        logger.level_filter = level;
        Arc::new(Mutex::new(logger))
    });
}

/// Flush the active output, if any.
pub fn flush_logger() -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => logger
            .lock()
            .map_err(|_| io::Error::other("global logger mutex poisoned"))?
            .flush(),
        None => Ok(()),
    }
}

/// Internal: execute a log operation with the global logger.
///
/// No-op when the logger is not initialized. Called by the logging macros.
#[inline]
pub(crate) fn log_message(level: LogLevel, message: &str) -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => {
            let guard = logger
                .lock()
                .map_err(|_| io::Error::other("global logger mutex poisoned"))?;
            guard.log(level, message)
        }
        None => Ok(()),
    }
}

/// Trace a function entry point, used by `trace_fn!()`.
#[inline]
#[allow(dead_code)]
pub(crate) fn trace_entry(fn_name: &str) -> io::Result<()> {
    let msg = format!("[ENTER:FNC] {}", fn_name);
    log_message(LogLevel::Debug, &msg)
}
