use chrono::Utc;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Severity of a log line. Ordered so that `Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    fn to_ansi_code(self) -> &'static str {
        match self {
            Level::Debug => "\x1b[36m", // Cyan
            Level::Info => "\x1b[32m",  // Green
            Level::Warn => "\x1b[93m",  // Bright Yellow
            Level::Error => "\x1b[91m", // Bright Red
        }
    }

    /// Parses a level name (case insensitive). Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Level> {
        match name.trim().to_lowercase().as_str() {
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }
}

/// Shared logger handle for the simulation process.
///
/// Every line has the shape `[LEVEL] [timestamp] [target]: message`, where
/// `target` names the component that emitted it (a world clock, a background
/// job, the store retry loop...). Lines go to an append-only file and,
/// optionally, to the console with colours. Clones share the same file and
/// the same write lock, so job threads never interleave half lines.
#[derive(Debug, Clone)]
pub struct Logger {
    log_file: Option<PathBuf>,
    min_level: Level,
    to_console: bool,
    write_lock: Arc<Mutex<()>>,
}

impl Logger {
    /// Creates a new `Logger` writing to `<log_dir>/tycoon_<instance>.log`.
    ///
    /// # Parameters
    /// - `log_dir`: Directory where the log file is created. It must already exist.
    /// - `instance`: Name of the running process, used in the file name.
    ///
    /// # Returns
    /// A new `Logger`, or `LoggerError::InvalidPath` if `log_dir` is not a directory.
    pub fn new(log_dir: &Path, instance: &str) -> Result<Self, LoggerError> {
        if !log_dir.is_dir() {
            return Err(LoggerError::InvalidPath(format!(
                "{} is not a directory.",
                log_dir.display()
            )));
        }

        let sanitized = instance.replace([':', '/', ' '], "_");
        let log_file = log_dir.join(format!("tycoon_{}.log", sanitized));

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_file)
            .map_err(LoggerError::from)?;

        Ok(Logger {
            log_file: Some(log_file),
            min_level: Level::Info,
            to_console: false,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// A logger that only writes to the console.
    pub fn console() -> Self {
        Logger {
            log_file: None,
            min_level: Level::Info,
            to_console: true,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A logger that drops everything. Used by tests.
    pub fn silent() -> Self {
        Logger {
            log_file: None,
            min_level: Level::Error,
            to_console: false,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_console(mut self, to_console: bool) -> Self {
        self.to_console = to_console;
        self
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level && (self.to_console || self.log_file.is_some())
    }

    /// Writes one line if `level` passes the filter.
    pub fn log(&self, level: Level, target: &str, message: &str) -> Result<(), LoggerError> {
        if !self.enabled(level) {
            return Ok(());
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let line = format!(
            "[{}] [{}] [{}]: {}\n",
            level.label(),
            timestamp,
            target,
            message
        );

        let _guard = self.write_lock.lock().map_err(|_| LoggerError::LockPoisoned)?;

        if self.to_console {
            print!("{}{}\x1b[0m", level.to_ansi_code(), line);
            io::stdout().flush().map_err(LoggerError::from)?;
        }

        if let Some(path) = &self.log_file {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(LoggerError::from)?;
            file.write_all(line.as_bytes()).map_err(LoggerError::from)?;
            file.flush().map_err(LoggerError::from)?;
        }

        Ok(())
    }

    pub fn debug(&self, target: &str, message: &str) {
        let _ = self.log(Level::Debug, target, message);
    }

    pub fn info(&self, target: &str, message: &str) {
        let _ = self.log(Level::Info, target, message);
    }

    pub fn warn(&self, target: &str, message: &str) {
        let _ = self.log(Level::Warn, target, message);
    }

    pub fn error(&self, target: &str, message: &str) {
        let _ = self.log(Level::Error, target, message);
    }
}

#[derive(Debug)]
pub enum LoggerError {
    IoError(std::io::Error),
    InvalidPath(String),
    LockPoisoned,
}

impl std::fmt::Display for LoggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggerError::IoError(e) => write!(f, "I/O Error: {}", e),
            LoggerError::InvalidPath(msg) => write!(f, "Invalid Path: {}", msg),
            LoggerError::LockPoisoned => write!(f, "Logger lock poisoned"),
        }
    }
}

impl std::error::Error for LoggerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoggerError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoggerError {
    fn from(err: std::io::Error) -> Self {
        LoggerError::IoError(err)
    }
}
