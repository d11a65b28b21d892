use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infrastructure::http::envelope;

/// Point-in-time run state of a scraper. Only trusted until the next poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScraperStatus {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub has_errors: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub urls_processed: u64,
    /// Server-formatted duration of the current or last run, e.g. `00:01:23`.
    #[serde(default)]
    pub elapsed_time: Option<String>,
}

impl ScraperStatus {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn running(urls_processed: u64) -> Self {
        Self {
            is_running: true,
            urls_processed,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            has_errors: true,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorProgress {
    #[serde(default)]
    pub percent_complete: f64,
    #[serde(default)]
    pub current_url: Option<String>,
    #[serde(default)]
    pub current_depth: u32,
    #[serde(default)]
    pub urls_processed: u64,
    #[serde(default)]
    pub urls_queued: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorPerformance {
    #[serde(default)]
    pub requests_per_second: f64,
    /// Resident memory of the crawl process in bytes.
    #[serde(default)]
    pub memory_usage: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Detailed progress of a running scraper.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    #[serde(default)]
    pub progress: MonitorProgress,
    #[serde(default)]
    pub performance: MonitorPerformance,
    #[serde(default, deserialize_with = "envelope::list")]
    pub recent_activity: Vec<ActivityEntry>,
}
