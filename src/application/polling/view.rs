use crate::application::display::{self, Controls, DisplayState, Notice};
use crate::domain::log_entry::LogEntry;
use crate::domain::scraper::Scraper;
use crate::domain::status::{MonitorSnapshot, ScraperStatus};

use super::query::Query;

/// Everything a detail view renders for one scraper.
#[derive(Debug, Clone, Default)]
pub struct ScraperView {
    pub scraper: Query<Scraper>,
    pub status: Query<ScraperStatus>,
    pub logs: Query<Vec<LogEntry>>,
    pub monitor: Query<MonitorSnapshot>,
    /// Start request in flight.
    pub starting: bool,
}

impl ScraperView {
    /// Status as of the latest attempt; `None` when that attempt failed.
    pub fn current_status(&self) -> Option<&ScraperStatus> {
        match self.status.error() {
            Some(_) => None,
            None => self.status.data(),
        }
    }

    pub fn display_state(&self) -> DisplayState {
        display::display_state(self.current_status())
    }

    /// Last observed run state, which drives poll cadence.
    pub fn is_running(&self) -> bool {
        self.status.data().map(|s| s.is_running).unwrap_or(false)
    }

    pub fn has_errors(&self) -> bool {
        self.status.data().map(|s| s.has_errors).unwrap_or(false)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.status.data().and_then(|s| s.error_message.as_deref())
    }

    pub fn urls_processed(&self) -> u64 {
        self.status.data().map(|s| s.urls_processed).unwrap_or(0)
    }

    pub fn controls(&self) -> Controls {
        display::controls(self.status.data(), self.starting)
    }

    pub fn monitor_notice(&self) -> Option<Notice> {
        self.monitor
            .error()
            .map(|e| display::monitor_notice(e, self.status.data()))
    }

    /// Seed for a new watch from a retained view: nothing is in flight.
    pub(crate) fn settled(mut self) -> Self {
        self.scraper.abandon();
        self.status.abandon();
        self.logs.abandon();
        self.monitor.abandon();
        self.starting = false;
        self
    }
}
