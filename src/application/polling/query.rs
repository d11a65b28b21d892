use std::time::Duration;
use tokio::time::Instant;

use crate::infrastructure::http::error::ApiError;

/// Cache entry for one resource. A failed refresh records the error but
/// keeps the last good value.
#[derive(Debug, Clone)]
pub struct Query<T> {
    data: Option<T>,
    error: Option<ApiError>,
    updated_at: Option<Instant>,
    fetching: bool,
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            updated_at: None,
            fetching: false,
        }
    }
}

impl<T> Query<T> {
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Time of the last successful fetch.
    pub fn updated_at(&self) -> Option<Instant> {
        self.updated_at
    }

    /// Initial load: a request is out and there is nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.fetching && self.data.is_none() && self.error.is_none()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    pub fn is_fresh(&self, window: Duration, now: Instant) -> bool {
        match self.updated_at {
            Some(at) if !window.is_zero() => now.saturating_duration_since(at) < window,
            _ => false,
        }
    }

    pub(crate) fn begin(&mut self) {
        self.fetching = true;
    }

    pub(crate) fn resolve(&mut self, result: Result<T, ApiError>, now: Instant) {
        self.fetching = false;
        match result {
            Ok(value) => {
                self.data = Some(value);
                self.error = None;
                self.updated_at = Some(now);
            }
            Err(e) => self.error = Some(e),
        }
    }

    /// The in-flight request was dropped without a result.
    pub(crate) fn abandon(&mut self) {
        self.fetching = false;
    }

    /// Mark stale so the next entry or focus refetches.
    pub(crate) fn invalidate(&mut self) {
        self.updated_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_last_good_value() {
        let now = Instant::now();
        let mut q: Query<u32> = Query::default();
        q.begin();
        assert!(q.is_loading());

        q.resolve(Ok(7), now);
        assert_eq!(q.data(), Some(&7));
        assert!(!q.is_loading());

        q.begin();
        assert!(q.is_fetching());
        assert!(!q.is_loading());
        q.resolve(Err(ApiError::Transport("refused".into())), now);
        assert_eq!(q.data(), Some(&7));
        assert!(q.error().is_some());
        assert_eq!(q.updated_at(), Some(now));

        q.resolve(Ok(8), now);
        assert!(q.error().is_none());
    }

    #[test]
    fn freshness_window() {
        let start = Instant::now();
        let mut q: Query<u32> = Query::default();
        assert!(!q.is_fresh(Duration::from_secs(60), start));

        q.resolve(Ok(1), start);
        assert!(q.is_fresh(Duration::from_secs(60), start + Duration::from_secs(59)));
        assert!(!q.is_fresh(Duration::from_secs(60), start + Duration::from_secs(60)));
        assert!(!q.is_fresh(Duration::ZERO, start));

        q.invalidate();
        assert!(!q.is_fresh(Duration::from_secs(60), start));
        assert_eq!(q.data(), Some(&1));
    }
}
