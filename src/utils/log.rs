// src/utils/log.rs

//! Injected multi-sink logger with server-style formatting.
//!
//! Components receive a [`Logger`] at construction instead of writing to
//! global state. Each message fans out to every attached [`LogSink`]: the
//! `log` facade for the console, a timestamped file, or an in-memory buffer.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;

use crate::error::Result;

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Lenient parse; anything unrecognised is `Info`.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Destination for formatted log messages.
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, message: &str);
}

/// Forwards to the `log` crate macros.
#[derive(Debug, Default)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => log::debug!("{}", message),
            LogLevel::Info => log::info!("{}", message),
            LogLevel::Warn => log::warn!("{}", message),
            LogLevel::Error => log::error!("{}", message),
        }
    }
}

/// Appends `[timestamp] [LEVEL] message` lines to a log file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Create `<dir>/<name>_<YYYYmmdd_HHMMSS>.log`.
    pub fn create(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.log", name, stamp));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write(&self, level: LogLevel, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), message);
        }
    }
}

/// Captures `[LEVEL] message` lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write(&self, level: LogLevel, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("[{}] {}", level.as_str(), message));
        }
    }
}

/// Cloneable logging handle over a set of sinks.
#[derive(Clone)]
pub struct Logger {
    sinks: Vec<Arc<dyn LogSink>>,
    level: LogLevel,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Info).with_sink(Arc::new(FacadeSink))
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("sinks", &self.sinks.len())
            .field("level", &self.level)
            .finish()
    }
}

impl Logger {
    /// A logger with no sinks.
    pub fn new(level: LogLevel) -> Self {
        Self {
            sinks: Vec::new(),
            level,
        }
    }

    /// A logger that discards everything.
    pub fn silent() -> Self {
        Self::new(LogLevel::Error)
    }

    /// A debug-level logger backed by a fresh [`MemorySink`].
    pub fn memory() -> (Self, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let logger = Self::new(LogLevel::Debug).with_sink(sink.clone());
        (logger, sink)
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn emit(&self, level: LogLevel, message: &str) {
        if level < self.level {
            return;
        }
        for sink in &self.sinks {
            sink.write(level, message);
        }
    }

    /// Log a debug message
    pub fn debug(&self, message: &str) {
        self.emit(LogLevel::Debug, message);
    }

    /// Log an info message
    pub fn info(&self, message: &str) {
        self.emit(LogLevel::Info, message);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str) {
        self.emit(LogLevel::Warn, message);
    }

    /// Log an error message
    pub fn error(&self, message: &str) {
        self.emit(LogLevel::Error, message);
    }

    /// Log a success message (shown as INFO)
    pub fn success(&self, message: &str) {
        self.emit(LogLevel::Info, &format!("✓ {}", message));
    }

    /// Log a step in a process
    pub fn step(&self, step_num: usize, total: usize, message: &str) {
        self.emit(
            LogLevel::Info,
            &format!("[STEP {}/{}] {}", step_num, total, message),
        );
    }

    /// Log a header
    pub fn header(&self, title: &str) {
        let border = "═".repeat(60);
        self.emit(LogLevel::Info, &border);
        self.emit(LogLevel::Info, &format!("  {}", title));
        self.emit(LogLevel::Info, &border);
    }

    /// Log a sub-item (indented)
    pub fn sub_item(&self, message: &str) {
        self.emit(LogLevel::Info, &format!("    {}", message));
    }

    /// Log a summary section
    pub fn summary(&self, title: &str, items: &[(&str, String)]) {
        self.emit(LogLevel::Info, &format!("[SUMMARY] {}", title));
        for (key, value) in items {
            self.emit(LogLevel::Info, &format!("    {}: {}", key, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from_str("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_level_filtering() {
        let sink = Arc::new(MemorySink::default());
        let logger = Logger::new(LogLevel::Warn).with_sink(sink.clone());

        logger.info("hidden");
        logger.warn("shown");
        logger.error("also shown");

        assert_eq!(sink.lines(), vec!["[WARN] shown", "[ERROR] also shown"]);
    }

    #[test]
    fn test_fan_out_to_every_sink() {
        let first = Arc::new(MemorySink::default());
        let second = Arc::new(MemorySink::default());
        let logger = Logger::new(LogLevel::Info)
            .with_sink(first.clone())
            .with_sink(second.clone());

        logger.summary("Run", &[("notes", "3".to_string())]);

        assert_eq!(first.lines(), second.lines());
        assert!(first.contains("[SUMMARY] Run"));
        assert!(first.contains("notes: 3"));
    }

    #[test]
    fn test_file_sink_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FileSink::create(dir.path(), "crawler").unwrap());
        let logger = Logger::new(LogLevel::Info).with_sink(sink.clone());

        logger.info("hello file");

        let content = fs::read_to_string(sink.path()).unwrap();
        assert!(content.contains("[INFO] hello file"));
        let name = sink.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("crawler_") && name.ends_with(".log"));
    }
}
