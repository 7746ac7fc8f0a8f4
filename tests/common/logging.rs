//! Test logging with an auto-dump on failure.
//!
//! Entries carry the elapsed time since the test started, a level, a
//! category and optional key/value context:
//!
//! ```text
//! [   0.001s] INFO  [setup]  Recording session
//!            session = list-items
//! ```

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub elapsed: Duration,
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    pub context: Vec<(String, String)>,
}

impl LogEntry {
    pub fn format(&self) -> String {
        let mut out = format!(
            "[{:>8.3}s] {} [{}] {}\n",
            self.elapsed.as_secs_f64(),
            self.level.label(),
            self.category,
            self.message
        );
        for (key, value) in &self.context {
            let _ = writeln!(out, "           {key} = {value}");
        }
        out
    }
}

pub struct TestLogger {
    start: Instant,
    min_level: LogLevel,
    entries: Mutex<Vec<LogEntry>>,
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLogger {
    pub fn new() -> Self {
        Self::with_min_level(LogLevel::Debug)
    }

    pub fn with_min_level(min_level: LogLevel) -> Self {
        Self {
            start: Instant::now(),
            min_level,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, level: LogLevel, category: &str, message: impl Into<String>) {
        self.with_context(level, category, message, |_| {});
    }

    pub fn debug(&self, category: &str, message: impl Into<String>) {
        self.log(LogLevel::Debug, category, message);
    }

    pub fn info(&self, category: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, category, message);
    }

    pub fn warn(&self, category: &str, message: impl Into<String>) {
        self.log(LogLevel::Warn, category, message);
    }

    pub fn with_context<F>(&self, level: LogLevel, category: &str, message: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Vec<(String, String)>),
    {
        if level < self.min_level {
            return;
        }
        let mut context = Vec::new();
        f(&mut context);
        let entry = LogEntry {
            elapsed: self.start.elapsed(),
            level,
            category: category.to_string(),
            message: message.into(),
            context,
        };
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }

    pub fn info_ctx<F>(&self, category: &str, message: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Vec<(String, String)>),
    {
        self.with_context(LogLevel::Info, category, message, f);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn dump(&self) -> String {
        self.entries().iter().map(LogEntry::format).collect()
    }

    pub fn write_dump_to_path(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.dump())
    }
}

/// Routes the library's `tracing` output through the test writer, once per
/// test binary. Filter with `RUST_LOG`.
pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}
