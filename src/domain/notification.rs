use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::display::DisplayState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    ScraperStarted,
    ScraperCompleted,
    ScraperFailed,
    ContentChanged,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub severity: Severity,
    pub message: String,
    pub read: bool,
    pub scraper_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            message: message.into(),
            read: false,
            scraper_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_scraper(mut self, scraper_id: impl Into<String>) -> Self {
        self.scraper_id = Some(scraper_id.into());
        self
    }

    /// Notification for a change in a scraper's display state, if the change
    /// is worth telling the user about.
    pub fn from_transition(
        scraper_id: &str,
        scraper_name: &str,
        previous: DisplayState,
        next: DisplayState,
    ) -> Option<Self> {
        let notification = match (previous, next) {
            (p, n) if p == n => return None,
            (_, DisplayState::Error) => Self::new(
                NotificationKind::ScraperFailed,
                Severity::Error,
                format!("Scraper '{}' failed", scraper_name),
            ),
            (DisplayState::Running, DisplayState::Idle) => Self::new(
                NotificationKind::ScraperCompleted,
                Severity::Success,
                format!("Scraper '{}' completed", scraper_name),
            ),
            (_, DisplayState::Running) => Self::new(
                NotificationKind::ScraperStarted,
                Severity::Info,
                format!("Scraper '{}' started", scraper_name),
            ),
            _ => return None,
        };
        Some(notification.for_scraper(scraper_id))
    }
}

/// Client-local inbox. Read state is never sent back to the server.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    items: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first.
    pub fn push(&mut self, notification: Notification) {
        self.items.insert(0, notification);
    }

    pub fn all(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn mark_read(&mut self, id: Uuid) -> bool {
        self.set_read(id, true)
    }

    pub fn mark_unread(&mut self, id: Uuid) -> bool {
        self.set_read(id, false)
    }

    pub fn toggle_read(&mut self, id: Uuid) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = !n.read;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in &mut self.items {
            n.read = true;
        }
    }

    pub fn dismiss(&mut self, id: Uuid) -> Option<Notification> {
        let index = self.items.iter().position(|n| n.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn for_scraper<'a>(&'a self, scraper_id: &'a str) -> impl Iterator<Item = &'a Notification> + 'a {
        self.items
            .iter()
            .filter(move |n| n.scraper_id.as_deref() == Some(scraper_id))
    }

    fn set_read(&mut self, id: Uuid, read: bool) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = read;
                true
            }
            None => false,
        }
    }
}
