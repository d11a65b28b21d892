use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::infrastructure::http::client::ScraperApi;
use crate::infrastructure::http::error::ApiError;

use super::policy::{PollingPolicy, Resource};
use super::query::Query;
use super::view::ScraperView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Foreground,
    Background,
}

/// Why a poll loop woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Mount,
    Focus,
    Timer,
    Invalidated,
    RunningChanged,
}

#[derive(Default)]
pub(crate) struct Invalidations {
    metadata: Notify,
    status: Notify,
    logs: Notify,
    monitor: Notify,
}

impl Invalidations {
    fn get(&self, resource: Resource) -> &Notify {
        match resource {
            Resource::Metadata => &self.metadata,
            Resource::Status => &self.status,
            Resource::Logs => &self.logs,
            Resource::Monitor => &self.monitor,
        }
    }
}

pub(crate) struct RetainedView {
    pub view: ScraperView,
    pub at: Instant,
}

pub(crate) type Retained = Arc<Mutex<HashMap<String, RetainedView>>>;

/// State shared by the poll tasks of one scraper.
pub(crate) struct WatchShared {
    pub id: String,
    api: Arc<dyn ScraperApi>,
    policy: PollingPolicy,
    pub view: watch::Sender<ScraperView>,
    running: watch::Sender<bool>,
    visibility: watch::Receiver<Visibility>,
    invalidations: Invalidations,
}

impl WatchShared {
    pub fn invalidate(&self, resource: Resource) {
        self.invalidations.get(resource).notify_one();
    }

    fn is_fresh(&self, resource: Resource, running: bool) -> bool {
        let window = self.policy.freshness(resource, running);
        let now = Instant::now();
        let view = self.view.borrow();
        match resource {
            Resource::Metadata => view.scraper.is_fresh(window, now),
            Resource::Status => view.status.is_fresh(window, now),
            Resource::Logs => view.logs.is_fresh(window, now),
            Resource::Monitor => view.monitor.is_fresh(window, now),
        }
    }

    fn last_success(&self, resource: Resource) -> Option<Instant> {
        let view = self.view.borrow();
        match resource {
            Resource::Metadata => view.scraper.updated_at(),
            Resource::Status => view.status.updated_at(),
            Resource::Logs => view.logs.updated_at(),
            Resource::Monitor => view.monitor.updated_at(),
        }
    }

    fn set_fetching(&self, resource: Resource, fetching: bool) {
        self.view.send_modify(|view| match resource {
            Resource::Metadata => toggle(&mut view.scraper, fetching),
            Resource::Status => toggle(&mut view.status, fetching),
            Resource::Logs => toggle(&mut view.logs, fetching),
            Resource::Monitor => toggle(&mut view.monitor, fetching),
        });
    }

    fn store<T>(
        &self,
        resource: Resource,
        result: Result<T, ApiError>,
        select: impl FnOnce(&mut ScraperView) -> &mut Query<T>,
    ) {
        match &result {
            Ok(_) => debug!(scraper_id = %self.id, ?resource, "Fetched"),
            Err(ApiError::NotRunning(msg)) => {
                debug!(scraper_id = %self.id, ?resource, "Not running: {}", msg)
            }
            Err(e) => warn!(scraper_id = %self.id, ?resource, "Fetch failed: {}", e),
        }
        let now = Instant::now();
        self.view.send_modify(|view| select(view).resolve(result, now));
    }

    async fn fetch_and_store(&self, resource: Resource) {
        match resource {
            Resource::Metadata => {
                let result = self.api.get_scraper(&self.id).await;
                self.store(resource, result, |v| &mut v.scraper);
            }
            Resource::Status => {
                let result = self.api.get_status(&self.id).await;
                let running = result.as_ref().ok().map(|s| s.is_running);
                self.store(resource, result, |v| &mut v.status);
                if let Some(running) = running {
                    self.observe_running(running);
                }
            }
            Resource::Logs => {
                let result = self.api.get_logs(&self.id, self.policy.log_limit).await;
                self.store(resource, result, |v| &mut v.logs);
            }
            Resource::Monitor => {
                let result = self.api.get_monitor(&self.id).await;
                self.store(resource, result, |v| &mut v.monitor);
            }
        }
    }

    fn observe_running(&self, running: bool) {
        let changed = self.running.send_if_modified(|current| {
            if *current == running {
                false
            } else {
                *current = running;
                true
            }
        });
        if changed {
            let cadence = if running { "running" } else { "idle" };
            info!(scraper_id = %self.id, "Switching to {} poll cadence", cadence);
        }
    }

    /// Poll one resource until the task is aborted.
    async fn run(self: Arc<Self>, resource: Resource) {
        let mut running_rx = self.running.subscribe();
        let mut visibility = self.visibility.clone();
        let invalidated = self.invalidations.get(resource);
        let mut last_attempt: Option<Instant> = None;
        let mut wake = Wake::Mount;

        loop {
            if *visibility.borrow_and_update() == Visibility::Background {
                if visibility
                    .wait_for(|v| *v == Visibility::Foreground)
                    .await
                    .is_err()
                {
                    return;
                }
                wake = Wake::Focus;
            }

            // An invalidation while in the background left a permit behind
            if wake == Wake::Focus && invalidated.notified().now_or_never().is_some() {
                wake = Wake::Invalidated;
            }

            let running = *running_rx.borrow_and_update();
            let should_fetch = self.policy.enabled(resource, running)
                && match wake {
                    Wake::Timer | Wake::Invalidated => true,
                    Wake::Mount | Wake::Focus => !self.is_fresh(resource, running),
                    Wake::RunningChanged => {
                        resource == Resource::Monitor && !self.is_fresh(resource, running)
                    }
                };

            if should_fetch {
                last_attempt = Some(Instant::now());
                self.set_fetching(resource, true);
                let superseded = tokio::select! {
                    _ = self.fetch_and_store(resource) => false,
                    _ = invalidated.notified() => true,
                };
                if superseded {
                    debug!(scraper_id = %self.id, ?resource, "In-flight fetch superseded");
                    self.set_fetching(resource, false);
                    wake = Wake::Invalidated;
                    continue;
                }
            }

            // Our own status fetch may have flipped the run state
            let running = *running_rx.borrow_and_update();
            let deadline = self.policy.interval(resource, running).map(|interval| {
                let base = last_attempt
                    .or_else(|| self.last_success(resource))
                    .unwrap_or_else(Instant::now);
                base + interval
            });

            wake = tokio::select! {
                _ = sleep_until_opt(deadline) => Wake::Timer,
                _ = invalidated.notified() => Wake::Invalidated,
                changed = running_rx.changed() => match changed {
                    Ok(()) => Wake::RunningChanged,
                    Err(_) => return,
                },
                changed = visibility.changed() => match changed {
                    Ok(()) => Wake::Focus,
                    Err(_) => return,
                },
            };
        }
    }
}

fn toggle<T>(query: &mut Query<T>, fetching: bool) {
    if fetching {
        query.begin();
    } else {
        query.abandon();
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Live poll tasks for one scraper. Dropping it aborts every task and any
/// request they have in flight, and parks the last view for quick re-entry.
pub(crate) struct ScraperWatch {
    pub shared: Arc<WatchShared>,
    tasks: Vec<JoinHandle<()>>,
    retained: Retained,
}

impl ScraperWatch {
    pub fn spawn(
        id: String,
        api: Arc<dyn ScraperApi>,
        policy: PollingPolicy,
        visibility: watch::Receiver<Visibility>,
        seed: ScraperView,
        retained: Retained,
    ) -> Self {
        let running = seed.is_running();
        let (view, _) = watch::channel(seed);
        let (running, _) = watch::channel(running);

        let shared = Arc::new(WatchShared {
            id,
            api,
            policy,
            view,
            running,
            visibility,
            invalidations: Invalidations::default(),
        });

        let tasks = Resource::ALL
            .iter()
            .map(|resource| tokio::spawn(shared.clone().run(*resource)))
            .collect();

        debug!(scraper_id = %shared.id, "Polling started");
        Self {
            shared,
            tasks,
            retained,
        }
    }
}

impl Drop for ScraperWatch {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        let view = self.shared.view.borrow().clone().settled();
        if let Ok(mut retained) = self.retained.lock() {
            retained.insert(
                self.shared.id.clone(),
                RetainedView {
                    view,
                    at: Instant::now(),
                },
            );
        }
        debug!(scraper_id = %self.shared.id, "Polling stopped");
    }
}
