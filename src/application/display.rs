//! Status derivation shared by every list and detail view. All views must
//! classify the same status object the same way, so the rules live here and
//! nowhere else.

use serde::Serialize;
use std::fmt;

use crate::domain::notification::Severity;
use crate::domain::status::ScraperStatus;
use crate::infrastructure::http::error::ApiError;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayState {
    Running,
    Error,
    Idle,
    Unknown,
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DisplayState::Running => "running",
            DisplayState::Error => "error",
            DisplayState::Idle => "idle",
            DisplayState::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for DisplayState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(DisplayState::Running),
            "error" => Ok(DisplayState::Error),
            "idle" => Ok(DisplayState::Idle),
            "unknown" => Ok(DisplayState::Unknown),
            other => Err(format!("unknown display state: {}", other)),
        }
    }
}

/// `isRunning` wins over `hasErrors`; no status means `Unknown`.
pub fn display_state(status: Option<&ScraperStatus>) -> DisplayState {
    match status {
        None => DisplayState::Unknown,
        Some(s) if s.is_running => DisplayState::Running,
        Some(s) if s.has_errors => DisplayState::Error,
        Some(_) => DisplayState::Idle,
    }
}

/// Which lifecycle actions a view may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub can_start: bool,
    pub can_stop: bool,
    pub can_delete: bool,
}

pub fn controls(status: Option<&ScraperStatus>, starting: bool) -> Controls {
    let running = status.map(|s| s.is_running).unwrap_or(false);
    Controls {
        can_start: !running && !starting,
        can_stop: running,
        can_delete: !running && !starting,
    }
}

/// A message for a view to show, either inline or as a dismissible banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Banner for a failed start/stop/delete/create/update.
    pub fn from_mutation_error(action: &str, error: &AppError) -> Self {
        match error {
            AppError::Validation(v) => Self {
                severity: Severity::Warning,
                message: format!("Cannot {}: {}", action, v),
            },
            other => Self::error(format!("Failed to {}: {}", action, other)),
        }
    }
}

/// A monitor failure usually means the job ended between the status poll and
/// the monitor poll. Only a failure while status still says running is an error.
pub fn classify_monitor_failure(error: &ApiError, status: Option<&ScraperStatus>) -> Severity {
    let running = status.map(|s| s.is_running).unwrap_or(false);
    match error {
        ApiError::NotRunning(_) => Severity::Info,
        _ if !running => Severity::Info,
        _ => Severity::Error,
    }
}

pub fn monitor_notice(error: &ApiError, status: Option<&ScraperStatus>) -> Notice {
    match classify_monitor_failure(error, status) {
        Severity::Error => Notice::error(format!("Monitor unavailable: {}", error)),
        _ => Notice::info("Scraper is not currently running"),
    }
}

/// `3725` seconds renders as `1h 02m 05s`.
pub fn format_elapsed(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn format_memory(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(is_running: bool, has_errors: bool) -> ScraperStatus {
        ScraperStatus {
            is_running,
            has_errors,
            ..ScraperStatus::default()
        }
    }

    #[test]
    fn derivation_truth_table() {
        assert_eq!(display_state(Some(&status(true, false))), DisplayState::Running);
        assert_eq!(display_state(Some(&status(true, true))), DisplayState::Running);
        assert_eq!(display_state(Some(&status(false, true))), DisplayState::Error);
        assert_eq!(display_state(Some(&status(false, false))), DisplayState::Idle);
        assert_eq!(display_state(None), DisplayState::Unknown);
    }

    #[test]
    fn running_scraper_only_offers_stop() {
        let c = controls(Some(&status(true, false)), false);
        assert_eq!(
            c,
            Controls {
                can_start: false,
                can_stop: true,
                can_delete: false
            }
        );

        let c = controls(Some(&status(false, false)), true);
        assert!(!c.can_start);
        assert!(!c.can_delete);

        let c = controls(None, false);
        assert!(c.can_start);
        assert!(!c.can_stop);
    }

    #[test]
    fn monitor_failure_severity_follows_status() {
        let transport = ApiError::Transport("reset".into());
        assert_eq!(
            classify_monitor_failure(&transport, Some(&status(false, false))),
            Severity::Info
        );
        assert_eq!(
            classify_monitor_failure(&transport, Some(&status(true, false))),
            Severity::Error
        );
        assert_eq!(
            classify_monitor_failure(&ApiError::NotRunning("done".into()), Some(&status(true, false))),
            Severity::Info
        );

        let notice = monitor_notice(&transport, Some(&status(true, false)));
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(monitor_notice(&transport, None).severity, Severity::Info);
    }

    #[test]
    fn mutation_notices() {
        let err = AppError::Rejected("scraper is running".into());
        let notice = Notice::from_mutation_error("delete scraper", &err);
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(
            notice.message,
            "Failed to delete scraper: Action rejected: scraper is running"
        );
    }

    #[test]
    fn formatting() {
        assert_eq!(format_elapsed(5), "5s");
        assert_eq!(format_elapsed(65), "1m 05s");
        assert_eq!(format_elapsed(3725), "1h 02m 05s");
        assert_eq!(format_memory(512), "512 B");
        assert_eq!(format_memory(1_572_864), "1.5 MB");
        assert_eq!("Running".parse::<DisplayState>(), Ok(DisplayState::Running));
        assert_eq!(DisplayState::Error.to_string(), "error");
    }
}
