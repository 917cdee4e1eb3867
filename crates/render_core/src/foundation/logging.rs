//! Injected logging
//!
//! Components receive a [`Logger`] at construction and write leveled messages
//! through it. The logger forwards to a [`LogSink`] chosen by the application:
//! [`FacadeSink`] routes into the `log` crate (installed with `env_logger`),
//! while [`MemorySink`] keeps records in memory for tests and diagnostics.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use log::Level;

/// Destination for leveled text messages
pub trait LogSink: Send + Sync {
    /// Prepare the sink before the first message
    fn init(&self) {}

    /// Flush and release the sink after the last message
    fn shutdown(&self) {}

    /// Record a single message
    fn log(&self, level: Level, target: &str, message: &str);
}

/// Cloneable handle to a log sink, scoped to a target name
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    target: &'static str,
}

impl Logger {
    /// Create a logger writing to `sink`
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            target: "render_core",
        }
    }

    /// Logger backed by the `log` facade with the given default filter
    pub fn facade(default_filter: &str) -> Self {
        Self::new(Arc::new(FacadeSink::new(default_filter)))
    }

    /// Logger that drops every message
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Same sink, different target
    #[must_use]
    pub fn with_target(&self, target: &'static str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            target,
        }
    }

    /// Target name attached to every message
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Run the sink's init hook
    pub fn init(&self) {
        self.sink.init();
    }

    /// Run the sink's shutdown hook
    pub fn shutdown(&self) {
        self.sink.shutdown();
    }

    /// Log a message at `level`
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        self.sink.log(level, self.target, &message.to_string());
    }

    /// Log at trace level
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Level::Trace, message);
    }

    /// Log at debug level
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    /// Log at info level
    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    /// Log at warn level
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    /// Log at error level
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("target", &self.target).finish()
    }
}

/// Sink forwarding to the `log` crate
pub struct FacadeSink {
    default_filter: String,
}

impl FacadeSink {
    /// Create a facade sink; `default_filter` applies when `RUST_LOG` is unset
    pub fn new(default_filter: impl Into<String>) -> Self {
        Self {
            default_filter: default_filter.into(),
        }
    }
}

impl LogSink for FacadeSink {
    fn init(&self) {
        let env = env_logger::Env::default().default_filter_or(self.default_filter.as_str());
        // Another logger may already be installed by the host application
        let _ = env_logger::Builder::from_env(env).try_init();
    }

    fn shutdown(&self) {
        log::logger().flush();
    }

    fn log(&self, level: Level, target: &str, message: &str) {
        log::log!(target: target, level, "{}", message);
    }
}

struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: Level, _target: &str, _message: &str) {}
}

/// A single captured message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity
    pub level: Level,
    /// Component that produced the message
    pub target: String,
    /// Message text
    pub message: String,
}

/// Sink that keeps every record in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
    active: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of captured records
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any record at `level` contains `fragment`
    pub fn contains(&self, level: Level, fragment: &str) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|record| record.level == level && record.message.contains(fragment))
    }

    /// Drop all captured records
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// True between `init` and `shutdown`
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl LogSink for MemorySink {
    fn init(&self) {
        self.active.store(true, Ordering::Release);
    }

    fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn log(&self, level: Level, target: &str, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord {
                level,
                target: target.to_string(),
                message: message.to_string(),
            });
    }
}
