use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    #[serde(alias = "info", alias = "Information", alias = "information")]
    Info,
    #[serde(alias = "warning", alias = "Warn", alias = "warn")]
    Warning,
    #[serde(alias = "error", alias = "Critical", alias = "critical")]
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Entries at or above `min`, keeping server order.
pub fn filter_level(entries: &[LogEntry], min: LogLevel) -> Vec<&LogEntry> {
    entries.iter().filter(|e| e.level >= min).collect()
}

/// Follows a bounded window of recent log entries across refreshes and
/// yields each entry once.
#[derive(Debug, Default)]
pub struct LogTail {
    last: Option<DateTime<Utc>>,
    /// Messages already yielded at `last`.
    seen_at_last: HashSet<String>,
}

impl LogTail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries newer than anything yielded before, oldest first. The window
    /// may be in either order and may have dropped entries off its far end.
    pub fn advance<'a>(&mut self, window: &'a [LogEntry]) -> Vec<&'a LogEntry> {
        let mut fresh: Vec<&LogEntry> = window
            .iter()
            .filter(|e| match self.last {
                None => true,
                Some(last) => {
                    e.timestamp > last
                        || (e.timestamp == last && !self.seen_at_last.contains(&e.message))
                }
            })
            .collect();
        fresh.sort_by_key(|e| e.timestamp);

        if let Some(newest) = fresh.last().map(|e| e.timestamp) {
            if self.last != Some(newest) {
                self.seen_at_last.clear();
                self.last = Some(newest);
            }
            self.seen_at_last.extend(
                fresh
                    .iter()
                    .filter(|e| e.timestamp == newest)
                    .map(|e| e.message.clone()),
            );
        }
        fresh
    }
}
