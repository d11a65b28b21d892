use std::time::Duration;

use crate::config::settings::Polling;

/// Independently cached, independently fetched pieces of a scraper's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Metadata,
    Status,
    Logs,
    Monitor,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Metadata,
        Resource::Status,
        Resource::Logs,
        Resource::Monitor,
    ];
}

/// Fetch cadence per resource, keyed on the last observed `isRunning`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingPolicy {
    pub status_idle: Duration,
    pub status_running: Duration,
    pub logs_idle: Duration,
    pub logs_running: Duration,
    pub logs_fresh_idle: Duration,
    pub logs_fresh_running: Duration,
    pub metadata_fresh: Duration,
    pub monitor: Duration,
    /// How long a view outlives its last subscriber.
    pub retain: Duration,
    pub log_limit: u32,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            status_idle: Duration::from_secs(30),
            status_running: Duration::from_secs(5),
            logs_idle: Duration::from_secs(30),
            logs_running: Duration::from_secs(10),
            logs_fresh_idle: Duration::from_secs(60),
            logs_fresh_running: Duration::from_secs(5),
            metadata_fresh: Duration::from_secs(60),
            monitor: Duration::from_secs(5),
            retain: Duration::from_secs(300),
            log_limit: 100,
        }
    }
}

impl From<&Polling> for PollingPolicy {
    fn from(config: &Polling) -> Self {
        Self {
            status_idle: Duration::from_secs(config.status_idle_secs),
            status_running: Duration::from_secs(config.status_running_secs),
            logs_idle: Duration::from_secs(config.logs_idle_secs),
            logs_running: Duration::from_secs(config.logs_running_secs),
            logs_fresh_idle: Duration::from_secs(config.logs_fresh_idle_secs),
            logs_fresh_running: Duration::from_secs(config.logs_fresh_running_secs),
            metadata_fresh: Duration::from_secs(config.metadata_fresh_secs),
            monitor: Duration::from_secs(config.monitor_secs),
            retain: Duration::from_secs(config.retain_secs),
            log_limit: config.log_limit,
        }
    }
}

impl PollingPolicy {
    /// Whether the resource is fetched at all in this run state.
    pub fn enabled(&self, resource: Resource, running: bool) -> bool {
        resource != Resource::Monitor || running
    }

    /// Auto-poll interval; `None` means fetch only on entry, focus or invalidation.
    pub fn interval(&self, resource: Resource, running: bool) -> Option<Duration> {
        match (resource, running) {
            (Resource::Metadata, _) => None,
            (Resource::Status, false) => Some(self.status_idle),
            (Resource::Status, true) => Some(self.status_running),
            (Resource::Logs, false) => Some(self.logs_idle),
            (Resource::Logs, true) => Some(self.logs_running),
            (Resource::Monitor, false) => None,
            (Resource::Monitor, true) => Some(self.monitor),
        }
    }

    /// How long a successful fetch counts as fresh. Zero means always stale.
    pub fn freshness(&self, resource: Resource, running: bool) -> Duration {
        match (resource, running) {
            (Resource::Metadata, _) => self.metadata_fresh,
            (Resource::Logs, false) => self.logs_fresh_idle,
            (Resource::Logs, true) => self.logs_fresh_running,
            (Resource::Status, _) | (Resource::Monitor, _) => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::AppConfig;

    #[test]
    fn idle_and_running_cadence() {
        let policy = PollingPolicy::default();
        let secs = |d: Option<Duration>| d.map(|d| d.as_secs());

        assert_eq!(secs(policy.interval(Resource::Status, false)), Some(30));
        assert_eq!(secs(policy.interval(Resource::Status, true)), Some(5));
        assert_eq!(secs(policy.interval(Resource::Logs, false)), Some(30));
        assert_eq!(secs(policy.interval(Resource::Logs, true)), Some(10));
        assert_eq!(secs(policy.interval(Resource::Monitor, true)), Some(5));
        assert_eq!(policy.interval(Resource::Monitor, false), None);
        assert_eq!(policy.interval(Resource::Metadata, true), None);

        assert!(!policy.enabled(Resource::Monitor, false));
        assert!(policy.enabled(Resource::Monitor, true));
        assert!(policy.enabled(Resource::Metadata, false));
    }

    #[test]
    fn freshness_windows() {
        let policy = PollingPolicy::default();
        assert_eq!(policy.freshness(Resource::Metadata, false).as_secs(), 60);
        assert_eq!(policy.freshness(Resource::Logs, false).as_secs(), 60);
        assert_eq!(policy.freshness(Resource::Logs, true).as_secs(), 5);
        assert_eq!(policy.freshness(Resource::Status, false), Duration::ZERO);
    }

    #[test]
    fn config_defaults_produce_default_policy() {
        let config = AppConfig::defaults().unwrap();
        assert_eq!(PollingPolicy::from(&config.polling), PollingPolicy::default());
    }
}
