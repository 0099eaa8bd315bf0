//! Log writer module
//!
//! Thread-safe log writing to files or stdout/stderr, with a level threshold.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use super::Level;

/// Global log writer instance
static LOG_WRITER: OnceLock<LogWriter> = OnceLock::new();

/// Log output target
enum LogTarget {
    Stdout,
    Stderr,
    File(Mutex<File>),
}

/// Where the info/access stream goes when no file is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    /// Gateway mode: stdout is free for logs
    Stdout,
    /// CGI mode: stdout carries the response
    Stderr,
}

/// Thread-safe log writer
pub struct LogWriter {
    /// Info and access log target
    info: LogTarget,
    /// Error and warning target
    error: LogTarget,
    level: Level,
}

impl LogWriter {
    fn new(
        access_log_file: Option<&str>,
        error_log_file: Option<&str>,
        console: ConsoleTarget,
        level: Level,
    ) -> io::Result<Self> {
        let info = match access_log_file {
            Some(path) => LogTarget::File(Mutex::new(open_log_file(path)?)),
            None => match console {
                ConsoleTarget::Stdout => LogTarget::Stdout,
                ConsoleTarget::Stderr => LogTarget::Stderr,
            },
        };

        let error = match error_log_file {
            Some(path) => LogTarget::File(Mutex::new(open_log_file(path)?)),
            None => LogTarget::Stderr,
        };

        Ok(Self { info, error, level })
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    /// Write a leveled message. Errors and warnings go to the error target.
    pub fn write(&self, level: Level, message: &str) {
        if !self.enabled(level) {
            return;
        }
        match level {
            Level::Error | Level::Warn => write_to_target(&self.error, message),
            Level::Info | Level::Debug => write_to_target(&self.info, message),
        }
    }

    /// Write an access log line, bypassing the level threshold
    pub fn write_access(&self, message: &str) {
        write_to_target(&self.info, message);
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

fn write_to_target(target: &LogTarget, message: &str) {
    match target {
        LogTarget::Stdout => {
            println!("{message}");
        }
        LogTarget::Stderr => {
            eprintln!("{message}");
        }
        LogTarget::File(file) => {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{message}");
            }
        }
    }
}

/// Initialize the global log writer
///
/// Should be called once at startup. Returns an error if a log file cannot
/// be opened or the writer is already initialized.
pub fn init(
    access_log_file: Option<&str>,
    error_log_file: Option<&str>,
    console: ConsoleTarget,
    level: Level,
) -> io::Result<()> {
    let writer = LogWriter::new(access_log_file, error_log_file, console, level)?;
    LOG_WRITER.set(writer).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "Log writer already initialized",
        )
    })
}

/// The global log writer, if initialized
pub fn get() -> Option<&'static LogWriter> {
    LOG_WRITER.get()
}
