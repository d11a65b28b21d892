use std::cmp::Ordering;
use std::collections::HashMap;

use crate::application::display::{display_state, DisplayState};
use crate::domain::scraper::Scraper;
use crate::domain::status::ScraperStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    LastRun,
    Created,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "last-run" | "lastrun" => Ok(SortKey::LastRun),
            "created" => Ok(SortKey::Created),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

/// One row of the scraper list.
#[derive(Debug, Clone)]
pub struct ScraperRow<'a> {
    pub scraper: &'a Scraper,
    pub state: DisplayState,
}

#[derive(Debug, Clone, Default)]
pub struct ScraperFilter {
    pub search: Option<String>,
    pub state: Option<DisplayState>,
    pub sort: SortKey,
    pub descending: bool,
}

impl ScraperFilter {
    /// Rows matching the filter in the requested order. Scrapers without a
    /// fetched status are `Unknown`.
    pub fn apply<'a>(
        &self,
        scrapers: &'a [Scraper],
        statuses: &HashMap<String, ScraperStatus>,
    ) -> Vec<ScraperRow<'a>> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<ScraperRow<'a>> = scrapers
            .iter()
            .map(|scraper| ScraperRow {
                scraper,
                state: display_state(statuses.get(&scraper.id)),
            })
            .filter(|row| self.state.map_or(true, |s| row.state == s))
            .filter(|row| needle.as_deref().map_or(true, |n| matches(row.scraper, n)))
            .collect();

        rows.sort_by(|a, b| {
            let ord = compare(self.sort, a.scraper, b.scraper);
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        });
        rows
    }
}

fn matches(scraper: &Scraper, needle: &str) -> bool {
    [&scraper.name, &scraper.base_url, &scraper.start_url]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

fn compare(key: SortKey, a: &Scraper, b: &Scraper) -> Ordering {
    let by_name = || a.name.to_lowercase().cmp(&b.name.to_lowercase());
    match key {
        SortKey::Name => by_name(),
        // Never-run scrapers sort first
        SortKey::LastRun => a.last_run.cmp(&b.last_run).then_with(by_name),
        SortKey::Created => a.created_at.cmp(&b.created_at).then_with(by_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper(id: &str, name: &str, base_url: &str, last_run: Option<&str>) -> Scraper {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "baseUrl": base_url,
            "startUrl": base_url,
            "lastRun": last_run,
        }))
        .unwrap()
    }

    fn fixtures() -> (Vec<Scraper>, HashMap<String, ScraperStatus>) {
        let scrapers = vec![
            scraper("1", "UKGC", "https://gamblingcommission.gov.uk", Some("2024-05-02T00:00:00Z")),
            scraper("2", "mga", "https://mga.org.mt", None),
            scraper("3", "Curacao", "https://gaming-curacao.com", Some("2024-05-01T00:00:00Z")),
        ];
        let mut statuses = HashMap::new();
        statuses.insert("1".to_string(), ScraperStatus::running(10));
        statuses.insert("2".to_string(), ScraperStatus::failed("timeout"));
        (scrapers, statuses)
    }

    #[test]
    fn search_is_case_insensitive_over_name_and_urls() {
        let (scrapers, statuses) = fixtures();
        let filter = ScraperFilter {
            search: Some("GAMING".into()),
            ..ScraperFilter::default()
        };
        let rows = filter.apply(&scrapers, &statuses);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scraper.id, "3");
        assert_eq!(rows[0].state, DisplayState::Unknown);
    }

    #[test]
    fn filter_by_state() {
        let (scrapers, statuses) = fixtures();
        let filter = ScraperFilter {
            state: Some(DisplayState::Error),
            ..ScraperFilter::default()
        };
        let rows = filter.apply(&scrapers, &statuses);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scraper.name, "mga");
    }

    #[test]
    fn sorting() {
        let (scrapers, statuses) = fixtures();

        let names: Vec<_> = ScraperFilter::default()
            .apply(&scrapers, &statuses)
            .iter()
            .map(|r| r.scraper.id.clone())
            .collect();
        assert_eq!(names, vec!["3", "2", "1"]);

        let filter = ScraperFilter {
            sort: SortKey::LastRun,
            descending: true,
            ..ScraperFilter::default()
        };
        let ids: Vec<_> = filter
            .apply(&scrapers, &statuses)
            .iter()
            .map(|r| r.scraper.id.clone())
            .collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
    }
}
