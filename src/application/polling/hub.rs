use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::domain::scraper::{Scraper, ScraperDraft};
use crate::infrastructure::http::client::ScraperApi;
use crate::utils::error::AppError;

use super::policy::{PollingPolicy, Resource};
use super::view::ScraperView;
use super::watch::{Retained, ScraperWatch, Visibility};

/// Application-wide polling store. Created once at startup and handed to
/// whatever needs it; owns every live poll and the guarded mutations.
pub struct PollingHub {
    api: Arc<dyn ScraperApi>,
    policy: PollingPolicy,
    visibility: watch::Sender<Visibility>,
    watches: Mutex<HashMap<String, Weak<ScraperWatch>>>,
    retained: Retained,
}

/// A view's claim on a scraper's polls. Polling for the scraper stops when
/// the last subscription for it is dropped or unsubscribed.
pub struct Subscription {
    watch: Arc<ScraperWatch>,
    view: watch::Receiver<ScraperView>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.watch.shared.id
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> ScraperView {
        self.view.borrow().clone()
    }

    /// Wait for the next change. Marks the current value as seen.
    pub async fn changed(&mut self) -> ScraperView {
        // The sender lives as long as `self.watch`, so this cannot fail
        let _ = self.view.changed().await;
        self.view.borrow_and_update().clone()
    }

    /// Force a re-fetch of one resource, bypassing its schedule.
    pub fn refresh(&self, resource: Resource) {
        self.watch.shared.invalidate(resource);
    }

    pub fn unsubscribe(self) {}
}

/// Clears the starting flag when the start call finishes or is dropped.
struct StartingGuard(Option<Arc<ScraperWatch>>);

impl Drop for StartingGuard {
    fn drop(&mut self) {
        if let Some(watch) = &self.0 {
            watch
                .shared
                .view
                .send_if_modified(|view| std::mem::replace(&mut view.starting, false));
        }
    }
}

impl PollingHub {
    pub fn new(api: Arc<dyn ScraperApi>, policy: PollingPolicy) -> Self {
        let (visibility, _) = watch::channel(Visibility::Foreground);
        Self {
            api,
            policy,
            visibility,
            watches: Mutex::new(HashMap::new()),
            retained: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start observing a scraper, joining an existing poll if there is one.
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, id: &str) -> Subscription {
        let mut watches = self.watches.lock().unwrap_or_else(|e| e.into_inner());
        watches.retain(|_, w| w.strong_count() > 0);

        let watch = match watches.get(id).and_then(Weak::upgrade) {
            Some(watch) => watch,
            None => {
                let watch = Arc::new(ScraperWatch::spawn(
                    id.to_string(),
                    self.api.clone(),
                    self.policy.clone(),
                    self.visibility.subscribe(),
                    self.take_retained(id),
                    self.retained.clone(),
                ));
                watches.insert(id.to_string(), Arc::downgrade(&watch));
                watch
            }
        };

        let view = watch.shared.view.subscribe();
        Subscription { watch, view }
    }

    /// Console moved to or from the background. Nothing polls in the background.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.visibility.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
    }

    /// Force a re-fetch of a resource if the scraper is being watched, or
    /// mark the retained copy stale otherwise.
    pub fn invalidate(&self, id: &str, resource: Resource) {
        if let Some(watch) = self.live(id) {
            watch.shared.invalidate(resource);
            return;
        }
        if let Ok(mut retained) = self.retained.lock() {
            if let Some(entry) = retained.get_mut(id) {
                match resource {
                    Resource::Metadata => entry.view.scraper.invalidate(),
                    Resource::Status => entry.view.status.invalidate(),
                    Resource::Logs => entry.view.logs.invalidate(),
                    Resource::Monitor => entry.view.monitor.invalidate(),
                }
            }
        }
    }

    /// Latest known view, live or retained.
    pub fn view(&self, id: &str) -> Option<ScraperView> {
        if let Some(watch) = self.live(id) {
            return Some(watch.shared.view.borrow().clone());
        }
        let retained = self.retained.lock().ok()?;
        retained
            .get(id)
            .filter(|entry| entry.at.elapsed() < self.policy.retain)
            .map(|entry| entry.view.clone())
    }

    /// Rejected without a start request when the scraper is running or a
    /// start is already in flight. With no cached status, asks the server first.
    #[instrument(skip(self))]
    pub async fn start(&self, id: &str) -> Result<(), AppError> {
        let live = self.live(id);

        if let Some(watch) = &live {
            let mut rejection = None;
            watch.shared.view.send_if_modified(|view| {
                if view.starting {
                    rejection = Some("a start request is already in flight");
                    false
                } else if !view.controls().can_start {
                    rejection = Some("the scraper is already running");
                    false
                } else {
                    view.starting = true;
                    true
                }
            });
            if let Some(reason) = rejection {
                return Err(AppError::Rejected(format!("Cannot start {}: {}", id, reason)));
            }
        }

        let _starting = StartingGuard(live);
        if self.known_running(id).await? {
            return Err(AppError::Rejected(format!(
                "Cannot start {}: the scraper is already running",
                id
            )));
        }

        info!("Starting scraper {}", id);
        self.api.start_scraper(id).await?;
        self.invalidate(id, Resource::Status);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, id: &str) -> Result<(), AppError> {
        info!("Stopping scraper {}", id);
        self.api.stop_scraper(id).await?;
        self.invalidate(id, Resource::Status);
        Ok(())
    }

    /// Rejected without a delete request while the scraper is running or being
    /// started. With no cached status, asks the server first.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let starting = self.view(id).map(|v| v.starting).unwrap_or(false);
        if starting || self.known_running(id).await? {
            return Err(AppError::Rejected(format!(
                "Cannot delete {}: the scraper is running; stop it first",
                id
            )));
        }

        info!("Deleting scraper {}", id);
        self.api.delete_scraper(id).await?;
        self.invalidate(id, Resource::Status);
        Ok(())
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, draft: &ScraperDraft) -> Result<Scraper, AppError> {
        draft.validate()?;
        let scraper = self.api.create_scraper(draft).await?;
        info!("Created scraper {} ({})", scraper.name, scraper.id);
        Ok(scraper)
    }

    /// Stores the returned resource as fresh metadata and re-checks status.
    #[instrument(skip(self, draft))]
    pub async fn update(&self, id: &str, draft: &ScraperDraft) -> Result<Scraper, AppError> {
        draft.validate()?;
        let scraper = self.api.update_scraper(id, draft).await?;
        info!("Updated scraper {}", id);

        match self.live(id) {
            Some(watch) => {
                let stored = scraper.clone();
                watch
                    .shared
                    .view
                    .send_modify(|view| view.scraper.resolve(Ok(stored), Instant::now()));
                watch.shared.invalidate(Resource::Status);
            }
            None => self.invalidate(id, Resource::Metadata),
        }
        Ok(scraper)
    }

    /// Run state from the cached status, or from a fresh status request when
    /// nothing is cached. A failed request fails the caller.
    async fn known_running(&self, id: &str) -> Result<bool, AppError> {
        let cached = self
            .view(id)
            .and_then(|view| view.status.data().map(|s| s.is_running));
        match cached {
            Some(running) => Ok(running),
            None => {
                debug!("No cached status for {}, asking the server", id);
                Ok(self.api.get_status(id).await?.is_running)
            }
        }
    }

    fn live(&self, id: &str) -> Option<Arc<ScraperWatch>> {
        let watches = self.watches.lock().ok()?;
        watches.get(id).and_then(Weak::upgrade)
    }

    fn take_retained(&self, id: &str) -> ScraperView {
        let mut retained = self.retained.lock().unwrap_or_else(|e| e.into_inner());
        let retain = self.policy.retain;
        retained.retain(|_, entry| entry.at.elapsed() < retain);
        retained
            .remove(id)
            .map(|entry| entry.view)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::{MonitorSnapshot, ScraperStatus};
    use crate::infrastructure::http::client::MockScraperApi;
    use crate::infrastructure::http::error::ApiError;
    use std::time::Duration;

    fn scraper(id: &str) -> Scraper {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": "UKGC",
            "baseUrl": "https://example.com",
            "startUrl": "https://example.com/a"
        }))
        .unwrap()
    }

    fn reads(status: ScraperStatus) -> MockScraperApi {
        let mut api = MockScraperApi::new();
        api.expect_get_scraper().returning(|id| Ok(scraper(id)));
        api.expect_get_status().returning(move |_| Ok(status.clone()));
        api.expect_get_logs().returning(|_, _| Ok(Vec::new()));
        api.expect_get_monitor()
            .returning(|_| Ok(MonitorSnapshot::default()));
        api
    }

    async fn wait_for_status(sub: &mut Subscription) -> ScraperView {
        loop {
            let view = sub.view();
            if view.status.data().is_some() {
                return view;
            }
            tokio::time::timeout(Duration::from_secs(5), sub.changed())
                .await
                .expect("status never arrived");
        }
    }

    #[tokio::test]
    async fn delete_while_running_makes_no_request() {
        let mut api = reads(ScraperStatus::running(3));
        api.expect_delete_scraper().never();
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        let mut sub = hub.subscribe("1");
        let view = wait_for_status(&mut sub).await;
        assert!(view.is_running());
        assert!(!view.controls().can_delete);

        match hub.delete("1").await {
            Err(AppError::Rejected(msg)) => assert!(msg.contains("running")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn start_while_running_makes_no_request() {
        let mut api = reads(ScraperStatus::running(3));
        api.expect_start_scraper().never();
        api.expect_stop_scraper().times(1).returning(|_| Ok(()));
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        let mut sub = hub.subscribe("1");
        let view = wait_for_status(&mut sub).await;
        assert!(view.controls().can_stop);

        assert!(matches!(hub.start("1").await, Err(AppError::Rejected(_))));
        assert!(hub.stop("1").await.is_ok());
    }

    #[tokio::test]
    async fn delete_when_idle_goes_through() {
        let mut api = reads(ScraperStatus::idle());
        api.expect_delete_scraper()
            .times(1)
            .returning(|_| Ok(()));
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        let mut sub = hub.subscribe("1");
        wait_for_status(&mut sub).await;
        assert!(hub.delete("1").await.is_ok());
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_api() {
        let mut api = MockScraperApi::new();
        api.expect_create_scraper().never();
        api.expect_update_scraper().never();
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        let draft = ScraperDraft::new("", "not-a-url", "https://example.com");
        match hub.create(&draft).await {
            Err(AppError::Validation(v)) => {
                assert!(v.for_field("name").is_some());
                assert!(v.for_field("startUrl").is_some());
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert!(matches!(
            hub.update("1", &draft).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unwatched_running_scraper_is_checked_with_the_server() {
        let mut api = MockScraperApi::new();
        api.expect_get_status()
            .times(2)
            .returning(|_| Ok(ScraperStatus::running(3)));
        api.expect_delete_scraper().never();
        api.expect_start_scraper().never();
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        match hub.delete("1").await {
            Err(AppError::Rejected(msg)) => assert!(msg.contains("running")),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(matches!(hub.start("1").await, Err(AppError::Rejected(_))));
    }

    #[tokio::test]
    async fn unwatched_idle_scraper_goes_through() {
        let mut api = MockScraperApi::new();
        api.expect_get_status()
            .returning(|_| Ok(ScraperStatus::idle()));
        api.expect_start_scraper().times(1).returning(|_| Ok(()));
        api.expect_delete_scraper().times(1).returning(|_| Ok(()));
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        assert!(hub.start("1").await.is_ok());
        assert!(hub.delete("1").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_run_state_blocks_mutations() {
        let mut api = MockScraperApi::new();
        api.expect_get_status()
            .returning(|_| Err(ApiError::Transport("connection refused".into())));
        api.expect_delete_scraper().never();
        api.expect_start_scraper().never();
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        assert!(matches!(
            hub.delete("1").await,
            Err(AppError::Api(ApiError::Transport(_)))
        ));
        assert!(matches!(
            hub.start("1").await,
            Err(AppError::Api(ApiError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn mutation_errors_carry_status() {
        let mut api = MockScraperApi::new();
        api.expect_stop_scraper().returning(|_| {
            Err(ApiError::Http {
                status: 409,
                message: "Scraper is not running".into(),
            })
        });
        let hub = PollingHub::new(Arc::new(api), PollingPolicy::default());

        let err = hub.stop("1").await.unwrap_err();
        assert_eq!(err.status(), Some(409));
    }
}
