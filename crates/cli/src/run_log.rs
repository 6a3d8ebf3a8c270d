//! Process logger for `backfill run`.
//!
//! Every line is mirrored to stderr and appended to one cumulative buffer.
//! The buffer is written to the log file when the run completes, and again
//! by [`FlushGuard`] when the command returns on any path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

pub const DEFAULT_LOG_FILE: &str = "processing.log";

pub struct RunLog {
    level: LevelFilter,
    buffer: Mutex<String>,
}

impl RunLog {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            buffer: Mutex::new(String::new()),
        }
    }

    /// Install a leaked `RunLog` as the process logger.
    pub fn install(level: LevelFilter) -> Result<&'static RunLog, log::SetLoggerError> {
        let run_log: &'static RunLog = Box::leak(Box::new(RunLog::new(level)));
        log::set_logger(run_log)?;
        log::set_max_level(level);
        Ok(run_log)
    }

    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Overwrite `path` with everything logged so far.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.contents())
    }

    fn append(&self, line: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut buf = match self.buffer.lock() {
            Ok(buf) => buf,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.push_str(&format!("[{stamp}] {line}\n"));
    }
}

/// Console form of a log line. Info is printed bare.
fn format_line(level: Level, message: &str) -> String {
    match level {
        Level::Info => message.to_string(),
        other => format!("{other}: {message}"),
    }
}

impl Log for RunLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Dependencies (reqwest, rusqlite) log under their own targets
        metadata.level() <= self.level && metadata.target().starts_with("backfill")
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), &record.args().to_string());
        eprintln!("{line}");
        self.append(&line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Writes the run log to `path` when dropped.
pub struct FlushGuard {
    log: &'static RunLog,
    path: PathBuf,
}

impl FlushGuard {
    pub fn new(log: &'static RunLog, path: PathBuf) -> Self {
        Self { log, path }
    }

    pub fn flush(&self) {
        if let Err(e) = self.log.write_to(&self.path) {
            eprintln!("warning: cannot write log file {}: {e}", self.path.display());
        }
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        self.flush();
    }
}
