//! # Logging
//!
//! Two layers are provided:
//!
//! - process wide helpers (`init_logger`, `log_error`, ...) built on the `log`
//!   facade and `env_logger`, for binaries and tests;
//! - the [`LogSink`] trait, which every meter receives at construction. Meters
//!   never log through ambient state; they only talk to their sink.
//!
//! [`FacadeSink`] is the default sink and forwards into the `log` facade under
//! the `omnimeter` target, so `RUST_LOG=omnimeter=debug` shows protocol traffic.

use log::{debug, error, info, log_enabled, warn, Level};
use std::sync::{Arc, Mutex, PoisonError};

/// Initializes the logger with the `env_logger` crate.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(cfg!(test)).try_init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}

/// Destination for diagnostic lines produced by a meter.
///
/// `context` is the label of the command in flight (for example `setCTRatio`
/// or `request[v4A]`), empty when idle.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, context: &str, message: &str);
}

/// Shared handle to a sink, cloned into every component of a meter.
pub type SharedSink = Arc<dyn LogSink>;

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, level: Level, context: &str, message: &str) {
        if context.is_empty() {
            log::log!(target: "omnimeter", level, "{message}");
        } else {
            log::log!(target: "omnimeter", level, "({context}) {message}");
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: Level, _context: &str, _message: &str) {}
}

/// Keeps every line in memory. Used by tests to assert on diagnostics.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of captured lines, formatted as `(context) message`.
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, context: &str, message: &str) {
        let line = if context.is_empty() {
            message.to_string()
        } else {
            format!("({context}) {message}")
        };
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, line));
    }
}

/// Default sink used when a meter is built without one.
pub fn default_sink() -> SharedSink {
    Arc::new(FacadeSink)
}
