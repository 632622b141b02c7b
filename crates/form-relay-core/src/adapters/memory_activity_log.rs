//! # In-Memory Activity Log
//!
//! Capped ring of [`LogEntry`] values. Every append is mirrored to `tracing`.

use crate::activity_log::{ActivityLog, LogCounts, LogEntry, LogLevel};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Default number of retained entries
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Activity log holding at most `capacity` entries; the oldest is evicted
/// first
#[derive(Debug)]
pub struct InMemoryActivityLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// A capacity of zero is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panic while holding the lock cannot leave the deque half-written
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog for InMemoryActivityLog {
    fn append(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Info | LogLevel::Success => {
                info!(activity = %entry.level, "{}", entry.message)
            }
            LogLevel::Warning => warn!(activity = %entry.level, "{}", entry.message),
            LogLevel::Error => error!(activity = %entry.level, "{}", entry.message),
        }

        let mut entries = self.entries();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn clear(&self) {
        self.entries().clear();
    }

    fn counts(&self) -> LogCounts {
        let entries = self.entries();
        let mut counts = LogCounts {
            last_activity: entries.back().map(|entry| entry.timestamp),
            ..LogCounts::default()
        };

        for entry in entries.iter() {
            match entry.level {
                LogLevel::Success => counts.success += 1,
                LogLevel::Error => counts.error += 1,
                LogLevel::Info | LogLevel::Warning => {}
            }
        }

        counts
    }
}

#[cfg(test)]
#[path = "memory_activity_log_tests.rs"]
mod tests;
