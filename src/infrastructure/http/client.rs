use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::config::settings::Api as ApiConfig;
use crate::domain::analytics::{AnalyticsOverview, ScraperMetrics};
use crate::domain::log_entry::LogEntry;
use crate::domain::schedule::{Schedule, ScheduleDraft};
use crate::domain::scraper::{Scraper, ScraperDraft};
use crate::domain::status::{MonitorSnapshot, ScraperStatus};
use crate::infrastructure::http::envelope::decode_list;
use crate::infrastructure::http::error::ApiError;

/// Scraper resource operations of the management API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScraperApi: Send + Sync {
    async fn list_scrapers(&self) -> Result<Vec<Scraper>, ApiError>;
    async fn get_scraper(&self, id: &str) -> Result<Scraper, ApiError>;
    async fn create_scraper(&self, draft: &ScraperDraft) -> Result<Scraper, ApiError>;
    async fn update_scraper(&self, id: &str, draft: &ScraperDraft) -> Result<Scraper, ApiError>;
    async fn delete_scraper(&self, id: &str) -> Result<(), ApiError>;
    async fn get_status(&self, id: &str) -> Result<ScraperStatus, ApiError>;
    async fn get_logs(&self, id: &str, limit: u32) -> Result<Vec<LogEntry>, ApiError>;
    async fn get_monitor(&self, id: &str) -> Result<MonitorSnapshot, ApiError>;
    async fn start_scraper(&self, id: &str) -> Result<(), ApiError>;
    async fn stop_scraper(&self, id: &str) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ScheduleApi: Send + Sync {
    async fn list_schedules(&self) -> Result<Vec<Schedule>, ApiError>;
    async fn get_schedule(&self, id: &str) -> Result<Schedule, ApiError>;
    async fn create_schedule(&self, draft: &ScheduleDraft) -> Result<Schedule, ApiError>;
    async fn update_schedule(&self, id: &str, draft: &ScheduleDraft) -> Result<Schedule, ApiError>;
    async fn delete_schedule(&self, id: &str) -> Result<(), ApiError>;
}

/// Aggregate read-only analytics.
#[async_trait]
pub trait AnalyticsApi: Send + Sync {
    async fn overview(&self) -> Result<AnalyticsOverview, ApiError>;
    async fn scraper_metrics(&self, id: &str) -> Result<ScraperMetrics, ApiError>;
}

/// HTTP client for the scraper management API. Performs no retries; retry
/// policy belongs to the caller.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Self::with_client(http, &config.base_url)
    }

    pub fn with_client(http: HttpClient, base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Request failed with {}: {}", status, body);
        Err(ApiError::from_response(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.send(self.http.get(url)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_list<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, ApiError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(decode_list(&bytes)?)
    }

    /// Decode the body if there is one. `None` for empty bodies (204 and friends).
    async fn optional_json<T: DeserializeOwned>(response: Response) -> Result<Option<T>, ApiError> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

fn mentions_not_running(message: &str) -> bool {
    message.to_ascii_lowercase().contains("not running")
}

#[async_trait]
impl ScraperApi for ApiClient {
    async fn list_scrapers(&self) -> Result<Vec<Scraper>, ApiError> {
        self.get_list(self.http.get(self.endpoint(&["api", "scrapers"])))
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_scraper(&self, id: &str) -> Result<Scraper, ApiError> {
        self.get_json(self.endpoint(&["api", "scrapers", id])).await
    }

    #[instrument(level = "debug", skip(self, draft), fields(name = %draft.name))]
    async fn create_scraper(&self, draft: &ScraperDraft) -> Result<Scraper, ApiError> {
        let request = self.http.post(self.endpoint(&["api", "scrapers"])).json(draft);
        let response = self.send(request).await?;
        Self::optional_json(response)
            .await?
            .ok_or_else(|| ApiError::Decode("create returned an empty body".into()))
    }

    #[instrument(level = "debug", skip(self, draft))]
    async fn update_scraper(&self, id: &str, draft: &ScraperDraft) -> Result<Scraper, ApiError> {
        let request = self.http.put(self.endpoint(&["api", "scrapers", id])).json(draft);
        let response = self.send(request).await?;
        match Self::optional_json(response).await? {
            Some(scraper) => Ok(scraper),
            None => self.get_scraper(id).await,
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_scraper(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.http.delete(self.endpoint(&["api", "scrapers", id])))
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_status(&self, id: &str) -> Result<ScraperStatus, ApiError> {
        self.get_json(self.endpoint(&["api", "scrapers", id, "status"]))
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_logs(&self, id: &str, limit: u32) -> Result<Vec<LogEntry>, ApiError> {
        let request = self
            .http
            .get(self.endpoint(&["api", "scrapers", id, "logs"]))
            .query(&[("limit", limit)]);
        self.get_list(request).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_monitor(&self, id: &str) -> Result<MonitorSnapshot, ApiError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "scrapers", id, "monitor"]))
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(match ApiError::from_response(status, &body) {
                ApiError::Http { message, .. } if mentions_not_running(&message) => {
                    ApiError::NotRunning(message)
                }
                other => other,
            });
        }

        // The endpoint answers 200 with an `error` body once the job is gone
        let value: Value = serde_json::from_slice(&bytes)?;
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(ApiError::NotRunning(message.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    #[instrument(level = "debug", skip(self))]
    async fn start_scraper(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.http.post(self.endpoint(&["api", "scrapers", id, "start"])))
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn stop_scraper(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.http.post(self.endpoint(&["api", "scrapers", id, "stop"])))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleApi for ApiClient {
    async fn list_schedules(&self) -> Result<Vec<Schedule>, ApiError> {
        self.get_list(self.http.get(self.endpoint(&["api", "scheduling"])))
            .await
    }

    async fn get_schedule(&self, id: &str) -> Result<Schedule, ApiError> {
        self.get_json(self.endpoint(&["api", "scheduling", id])).await
    }

    async fn create_schedule(&self, draft: &ScheduleDraft) -> Result<Schedule, ApiError> {
        let request = self.http.post(self.endpoint(&["api", "scheduling"])).json(draft);
        let response = self.send(request).await?;
        Self::optional_json(response)
            .await?
            .ok_or_else(|| ApiError::Decode("create returned an empty body".into()))
    }

    async fn update_schedule(&self, id: &str, draft: &ScheduleDraft) -> Result<Schedule, ApiError> {
        let request = self.http.put(self.endpoint(&["api", "scheduling", id])).json(draft);
        let response = self.send(request).await?;
        match Self::optional_json(response).await? {
            Some(schedule) => Ok(schedule),
            None => self.get_schedule(id).await,
        }
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.http.delete(self.endpoint(&["api", "scheduling", id])))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsApi for ApiClient {
    async fn overview(&self) -> Result<AnalyticsOverview, ApiError> {
        self.get_json(self.endpoint(&["api", "analytics", "overview"]))
            .await
    }

    async fn scraper_metrics(&self, id: &str) -> Result<ScraperMetrics, ApiError> {
        self.get_json(self.endpoint(&["api", "analytics", "scrapers", id]))
            .await
    }
}

/// Stand-in analytics backend for deployments without the analytics
/// endpoints. Returns empty summaries.
#[derive(Debug, Clone, Default)]
pub struct StubAnalytics;

#[async_trait]
impl AnalyticsApi for StubAnalytics {
    async fn overview(&self) -> Result<AnalyticsOverview, ApiError> {
        Ok(AnalyticsOverview::default())
    }

    async fn scraper_metrics(&self, id: &str) -> Result<ScraperMetrics, ApiError> {
        Ok(ScraperMetrics {
            scraper_id: id.to_string(),
            ..ScraperMetrics::default()
        })
    }
}
