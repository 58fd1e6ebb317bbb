//! Leveled, process-wide logging: a bounded in-memory ring of formatted
//! lines, with an optional stdout mirror gated by a level threshold.
//!
//! Each call formats a line and best-effort writes it into the ring --
//! there's nowhere better to report a logging failure than to ignore it.
//! The ring lives behind a single mutex rather than as a per-connection file
//! handle, so the admin surface can snapshot it as a bounded, point-in-time
//! view instead of tailing an append-only file.

use std::collections::VecDeque;
use std::sync::Mutex;

use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => " INFO",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    /// `file:line, member` trailer, present when the call site supplied one.
    pub location: Option<String>,
}

impl LogEntry {
    pub fn format(&self) -> String {
        match &self.location {
            Some(loc) => format!("{} [{}] {}  ({})", self.timestamp, self.level.label(), self.message, loc),
            None => format!("{} [{}] {}", self.timestamp, self.level.label(), self.message),
        }
    }
}

fn timestamp_now() -> String {
    let now = OffsetDateTime::now_utc();
    let millis = now.millisecond();
    format!(
        "{:04}-{:02}-{:02}, {:02}:{:02}:{:02}.{:03}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        millis,
    )
}

struct Inner {
    capacity: usize,
    entries: VecDeque<LogEntry>,
    threshold: Level,
}

/// The bounded ring buffer plus stdout-mirror threshold. One instance is
/// meant to live for the lifetime of the process (behind an `Arc` held by
/// the connection pipeline and the static-file server); `Logger::new`
/// doesn't reach for a global/`static` itself, leaving process-wide
/// ownership (construct once at startup, hand out clones of the `Arc`) to
/// the launcher.
pub struct Logger {
    inner: Mutex<Inner>,
}

impl Logger {
    pub fn new(capacity: usize) -> Self {
        Logger { inner: Mutex::new(Inner { capacity, entries: VecDeque::with_capacity(capacity), threshold: Level::Info }) }
    }

    pub fn set_stdout_threshold(&self, level: Level) {
        self.inner.lock().unwrap().threshold = level;
    }

    pub fn log(&self, level: Level, message: impl Into<String>, location: Option<String>) {
        let entry = LogEntry { timestamp: timestamp_now(), level, message: message.into(), location };

        let mirror = {
            let mut guard = self.inner.lock().unwrap();
            if guard.entries.len() >= guard.capacity {
                guard.entries.pop_front();
            }
            let mirror = level >= guard.threshold;
            guard.entries.push_back(entry.clone());
            mirror
        };

        if mirror {
            println!("{}", entry.format());
        }
    }

    pub fn debug(&self, message: impl Into<String>, location: Option<String>) {
        self.log(Level::Debug, message, location)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message, None)
    }

    pub fn error(&self, message: impl Into<String>, location: Option<String>) {
        self.log(Level::Error, message, location)
    }

    /// Takes a snapshot of the current ring contents under the lock, oldest
    /// first, as formatted lines -- this is what the admin `GET
    /// admin/api/log` endpoint (external to this crate) would serialize.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().unwrap().entries.iter().map(LogEntry::format).collect()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let logger = Logger::new(2);
        logger.info("one");
        logger.info("two");
        logger.info("three");
        let snap = logger.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap[0].contains("two"));
        assert!(snap[1].contains("three"));
    }

    #[test]
    fn formatted_line_carries_level_and_location() {
        let logger = Logger::new(10);
        logger.error("boom", Some("error.rs:42, handle".to_string()));
        let snap = logger.snapshot();
        assert!(snap[0].contains("ERROR"));
        assert!(snap[0].contains("boom"));
        assert!(snap[0].contains("error.rs:42"));
    }
}
