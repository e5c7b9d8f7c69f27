// src/logging.rs

//! Status log collector with server-style formatting.
//!
//! Every log record becomes one `[HH:MM:SS] [LEVEL] message` line kept in a
//! bounded buffer until the display drains it.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Lines kept before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Crates whose chatter is only shown from `Warn` upwards.
const NOISY_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls", "sled", "mio"];

static STATUS_LOG: OnceLock<StatusLog> = OnceLock::new();

/// `log` backend that buffers formatted status lines.
#[derive(Debug)]
pub struct StatusLog {
    level: LevelFilter,
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl StatusLog {
    pub fn new(level: LevelFilter, capacity: usize) -> Self {
        Self {
            level,
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    /// Take every buffered line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        lines.drain(..).collect()
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl Log for StatusLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let noisy = NOISY_TARGETS
            .iter()
            .any(|target| metadata.target().starts_with(target));
        if noisy {
            metadata.level() <= Level::Warn
        } else {
            metadata.level() <= self.level
        }
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.push(format_line(record.level(), &record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

/// Format a message with timestamp and level.
pub fn format_line(level: Level, message: &str) -> String {
    format!("[{}] [{}] {}", Local::now().format("%H:%M:%S"), level, message)
}

/// Install the status log as the global logger.
///
/// Only the first call installs a logger; later calls return the same
/// instance.
pub fn init(level: LevelFilter) -> &'static StatusLog {
    let mut installed = false;
    let status = STATUS_LOG.get_or_init(|| {
        installed = true;
        StatusLog::new(level, DEFAULT_CAPACITY)
    });
    if installed && log::set_logger(status).is_ok() {
        log::set_max_level(level);
    }
    status
}
