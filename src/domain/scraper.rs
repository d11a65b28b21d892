use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::infrastructure::http::envelope;
use crate::utils::error::{AppError, ValidationErrors};

/// A crawl job definition as held by the management API. The console only
/// ever sees a cached, possibly stale copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scraper {
    #[serde(deserialize_with = "envelope::id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub output_directory: Option<String>,
    #[serde(default)]
    pub max_depth: u32,
    #[serde(default)]
    pub max_pages: u32,
    #[serde(default)]
    pub max_concurrent_requests: u32,
    /// Milliseconds between requests to the same host.
    #[serde(default)]
    pub delay_between_requests: u64,
    #[serde(default)]
    pub follow_links: bool,
    #[serde(default)]
    pub follow_external_links: bool,
    #[serde(default)]
    pub respect_robots_txt: bool,
    #[serde(default)]
    pub enable_change_detection: bool,
    #[serde(default)]
    pub track_content_versions: bool,
    #[serde(default)]
    pub enable_adaptive_crawling: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

/// Payload for create and update requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScraperDraft {
    pub name: String,
    pub base_url: String,
    pub start_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<String>,
    pub max_depth: u32,
    pub max_pages: u32,
    pub max_concurrent_requests: u32,
    pub delay_between_requests: u64,
    pub follow_links: bool,
    pub follow_external_links: bool,
    pub respect_robots_txt: bool,
    pub enable_change_detection: bool,
    pub track_content_versions: bool,
    pub enable_adaptive_crawling: bool,
}

impl ScraperDraft {
    pub fn new(name: impl Into<String>, start_url: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            start_url: start_url.into(),
            output_directory: None,
            max_depth: 5,
            max_pages: 1000,
            max_concurrent_requests: 5,
            delay_between_requests: 1000,
            follow_links: true,
            follow_external_links: false,
            respect_robots_txt: true,
            enable_change_detection: false,
            track_content_versions: false,
            enable_adaptive_crawling: false,
        }
    }

    /// Pre-fill an edit form from the cached resource.
    pub fn from_scraper(scraper: &Scraper) -> Self {
        Self {
            name: scraper.name.clone(),
            base_url: scraper.base_url.clone(),
            start_url: scraper.start_url.clone(),
            output_directory: scraper.output_directory.clone(),
            max_depth: scraper.max_depth,
            max_pages: scraper.max_pages,
            max_concurrent_requests: scraper.max_concurrent_requests,
            delay_between_requests: scraper.delay_between_requests,
            follow_links: scraper.follow_links,
            follow_external_links: scraper.follow_external_links,
            respect_robots_txt: scraper.respect_robots_txt,
            enable_change_detection: scraper.enable_change_detection,
            track_content_versions: scraper.track_content_versions,
            enable_adaptive_crawling: scraper.enable_adaptive_crawling,
        }
    }

    /// Client-side form checks. Runs before any request is issued.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            errors.add("name", "Name is required");
        }
        check_url(&mut errors, "startUrl", "Start URL", &self.start_url);
        check_url(&mut errors, "baseUrl", "Base URL", &self.base_url);

        if self.max_depth == 0 {
            errors.add("maxDepth", "Max depth must be at least 1");
        }
        if self.max_pages == 0 {
            errors.add("maxPages", "Max pages must be at least 1");
        }
        if self.max_concurrent_requests == 0 {
            errors.add("maxConcurrentRequests", "Max concurrent requests must be at least 1");
        }

        errors.into_result()
    }
}

fn check_url(errors: &mut ValidationErrors, field: &'static str, label: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, format!("{} is required", label));
        return;
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => errors.add(field, format!("{} must be an absolute http(s) URL", label)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_draft_passes() {
        let draft = ScraperDraft::new("UKGC", "https://example.com/a", "https://example.com");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn missing_and_malformed_fields_are_reported_per_field() {
        let mut draft = ScraperDraft::new("  ", "example.com/a", "");
        draft.max_concurrent_requests = 0;

        let err = match draft.validate() {
            Err(AppError::Validation(v)) => v,
            other => panic!("expected validation failure, got {:?}", other),
        };
        assert_eq!(err.for_field("name"), Some("Name is required"));
        assert_eq!(
            err.for_field("startUrl"),
            Some("Start URL must be an absolute http(s) URL")
        );
        assert_eq!(err.for_field("baseUrl"), Some("Base URL is required"));
        assert!(err.for_field("maxConcurrentRequests").is_some());
        assert!(err.for_field("maxDepth").is_none());
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let draft = ScraperDraft::new("ftp", "ftp://example.com/", "https://example.com");
        assert!(matches!(draft.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn scraper_parses_camel_case_with_defaults() {
        let scraper: Scraper = serde_json::from_str(
            r#"{
                "$id": "2",
                "id": 17,
                "name": "UKGC",
                "baseUrl": "https://example.com",
                "startUrl": "https://example.com/a",
                "maxDepth": 3,
                "enableChangeDetection": true,
                "lastRun": "2024-05-01T10:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(scraper.id, "17");
        assert_eq!(scraper.max_depth, 3);
        assert!(scraper.enable_change_detection);
        assert!(!scraper.follow_links);
        assert!(scraper.last_run.is_some());
        assert!(scraper.created_at.is_none());

        let draft = ScraperDraft::from_scraper(&scraper);
        assert_eq!(draft.start_url, "https://example.com/a");
    }
}
