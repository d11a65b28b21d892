use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infrastructure::http::envelope;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    #[serde(default)]
    pub total_scrapers: u64,
    #[serde(default)]
    pub active_scrapers: u64,
    #[serde(default)]
    pub total_urls_processed: u64,
    #[serde(default)]
    pub total_content_changes: u64,
    #[serde(default)]
    pub average_run_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub urls_processed: u64,
    #[serde(default)]
    pub errors: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScraperMetrics {
    #[serde(default, deserialize_with = "envelope::id")]
    pub scraper_id: String,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub urls_processed: u64,
    #[serde(default)]
    pub content_changes: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default, deserialize_with = "envelope::list")]
    pub recent_runs: Vec<RunSummary>,
}
