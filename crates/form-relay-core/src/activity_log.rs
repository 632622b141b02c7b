//! # Activity Log
//!
//! A short, capped history of what the relay has done. Operators read it
//! through the logs and stats endpoints; the success and error counts behind
//! `/api/stats` are derived from it.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One activity log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub message: String,
    #[serde(rename = "type")]
    pub level: LogLevel,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            message: message.into(),
            level,
        }
    }
}

/// Outcome counters over the retained entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCounts {
    pub success: usize,
    pub error: usize,
    pub last_activity: Option<Timestamp>,
}

impl LogCounts {
    pub fn total(&self) -> usize {
        self.success + self.error
    }

    /// Rounded percentage of successes; 100 when nothing has been recorded
    pub fn success_rate(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 100;
        }
        (self.success as f64 / total as f64 * 100.0).round() as u32
    }
}

/// Interface for the rolling activity log
///
/// Implementations must tolerate concurrent appends and never hold more
/// entries than their capacity.
pub trait ActivityLog: Send + Sync {
    fn append(&self, entry: LogEntry);

    /// Up to `limit` newest entries, oldest first
    fn recent(&self, limit: usize) -> Vec<LogEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);

    fn counts(&self) -> LogCounts;

    fn info(&self, message: &str) {
        self.append(LogEntry::new(LogLevel::Info, message));
    }

    fn success(&self, message: &str) {
        self.append(LogEntry::new(LogLevel::Success, message));
    }

    fn warning(&self, message: &str) {
        self.append(LogEntry::new(LogLevel::Warning, message));
    }

    fn error(&self, message: &str) {
        self.append(LogEntry::new(LogLevel::Error, message));
    }
}

#[cfg(test)]
#[path = "activity_log_tests.rs"]
mod tests;
