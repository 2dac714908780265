use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

const LOG_CAPACITY: usize = 200;
const CONSOLE_STAMP: &[FormatItem<'static>] = format_description!(
    "[year].[month].[day]-[hour]:[minute]:[second].[subsecond digits:3]"
);

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Off,
    Quiet,
    Normal,
}

/// Running activity log shared by the install and backup workflows.
///
/// Entries are kept in a bounded ring for the caller to inspect, appended to
/// the log file when one is configured, and optionally mirrored to the
/// terminal.
#[derive(Debug)]
pub struct ActivityLog {
    entries: Vec<LogEntry>,
    path: Option<PathBuf>,
    echo: Echo,
}

impl ActivityLog {
    pub fn new(path: Option<PathBuf>, echo: Echo) -> Self {
        Self {
            entries: Vec::new(),
            path,
            echo,
        }
    }

    /// In-memory log with no file and no terminal output.
    pub fn silent() -> Self {
        Self::new(None, Echo::Off)
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.message.as_str())
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        let timestamp = console_timestamp();
        match (self.echo, level) {
            (Echo::Off, _) => {}
            (Echo::Quiet, LogLevel::Info) => {}
            (_, LogLevel::Error) => eprintln!("[{timestamp}] {message}"),
            _ => println!("[{timestamp}] {message}"),
        }

        if let Some(path) = &self.path {
            let _ = append_log_file(path, level, &timestamp, &message);
        }

        self.entries.push(LogEntry {
            level,
            timestamp,
            message,
        });
        if self.entries.len() > LOG_CAPACITY {
            let overflow = self.entries.len() - LOG_CAPACITY;
            self.entries.drain(0..overflow);
        }
    }
}

fn console_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(CONSOLE_STAMP)
        .unwrap_or_default()
}

fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(
    path: &Path,
    level: LogLevel,
    timestamp: &str,
    message: &str,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{label}] [{timestamp}] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_entries() {
        let mut log = ActivityLog::silent();
        for index in 0..(LOG_CAPACITY + 5) {
            log.log_info(format!("line {index}"));
        }
        assert_eq!(log.entries().len(), LOG_CAPACITY);
        assert_eq!(log.entries()[0].message, "line 5");
    }

    #[test]
    fn appends_levelled_lines_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("modding-helper.log");
        let mut log = ActivityLog::new(Some(path.clone()), Echo::Off);
        log.log_info("Backup completed!".to_string());
        log.log_error("Error downloading mod: Sodium".to_string());

        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[INFO] ["));
        assert!(lines[0].ends_with("Backup completed!"));
        assert!(lines[1].starts_with("[ERROR] ["));
    }

    #[test]
    fn quiet_echo_still_records_entries() {
        let mut log = ActivityLog::new(None, Echo::Quiet);
        log.log_info("one".to_string());
        log.log_warn("two".to_string());
        let messages: Vec<&str> = log.messages().collect();
        assert_eq!(messages, vec!["one", "two"]);
        assert_eq!(log.entries()[1].level, LogLevel::Warn);
    }
}
