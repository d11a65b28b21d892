use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::infrastructure::http::envelope;
use crate::utils::error::{AppError, ValidationErrors};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(deserialize_with = "envelope::id")]
    pub id: String,
    #[serde(deserialize_with = "envelope::id")]
    pub scraper_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default, deserialize_with = "envelope::list")]
    pub days_of_week: Vec<Weekday>,
    /// `HH:MM`, UTC.
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active: bool,
}

impl Schedule {
    /// Next run strictly after `after`, computed locally from the recurrence.
    /// Inactive schedules and unparseable recurrences have none.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.active {
            return None;
        }
        next_occurrence(
            self.cron_expression.as_deref(),
            &self.days_of_week,
            self.time_of_day.as_deref(),
            after,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    pub scraper_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    pub days_of_week: Vec<Weekday>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    pub active: bool,
}

impl ScheduleDraft {
    pub fn cron(scraper_id: impl Into<String>, name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            scraper_id: scraper_id.into(),
            name: name.into(),
            cron_expression: Some(expression.into()),
            days_of_week: Vec::new(),
            time_of_day: None,
            active: true,
        }
    }

    pub fn weekly(
        scraper_id: impl Into<String>,
        name: impl Into<String>,
        days_of_week: Vec<Weekday>,
        time_of_day: impl Into<String>,
    ) -> Self {
        Self {
            scraper_id: scraper_id.into(),
            name: name.into(),
            cron_expression: None,
            days_of_week,
            time_of_day: Some(time_of_day.into()),
            active: true,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        if self.scraper_id.trim().is_empty() {
            errors.add("scraperId", "A scraper must be selected");
        }
        if self.name.trim().is_empty() {
            errors.add("name", "Name is required");
        }

        match self.cron_expression.as_deref().map(str::trim) {
            Some(expr) if !expr.is_empty() => {
                if let Err(e) = parse_cron(expr) {
                    errors.add("cronExpression", format!("Invalid cron expression: {}", e));
                }
            }
            _ => {
                if self.days_of_week.is_empty() {
                    errors.add("daysOfWeek", "Pick at least one day or give a cron expression");
                }
                match self.time_of_day.as_deref() {
                    Some(t) if parse_time(t).is_some() => {}
                    _ => errors.add("timeOfDay", "Time must be HH:MM"),
                }
            }
        }

        errors.into_result()
    }
}

/// Parse a cron expression, accepting the common 5-field form by prepending
/// a zero seconds field.
pub fn parse_cron(expr: &str) -> Result<CronSchedule, String> {
    let expr = expr.trim();
    let parsed = if expr.split_whitespace().count() == 5 {
        CronSchedule::from_str(&format!("0 {}", expr))
    } else {
        CronSchedule::from_str(expr)
    };
    parsed.map_err(|e| e.to_string())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

fn next_occurrence(
    cron_expression: Option<&str>,
    days: &[Weekday],
    time_of_day: Option<&str>,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if let Some(expr) = cron_expression.filter(|e| !e.trim().is_empty()) {
        return parse_cron(expr).ok()?.after(&after).next();
    }

    let time = parse_time(time_of_day?)?;
    (0..=7)
        .map(|offset| after.date_naive() + Duration::days(offset))
        .filter(|date| days.contains(&date.weekday()))
        .map(|date| date.and_time(time).and_utc())
        .find(|candidate| *candidate > after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn five_field_cron_is_accepted() {
        let draft = ScheduleDraft::cron("1", "nightly", "30 2 * * *");
        assert!(draft.validate().is_ok());

        let draft = ScheduleDraft::cron("1", "nightly", "not a cron");
        match draft.validate() {
            Err(AppError::Validation(v)) => assert!(v.for_field("cronExpression").is_some()),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn weekly_draft_requires_days_and_time() {
        let draft = ScheduleDraft::weekly("1", "weekly", vec![], "25:00");
        match draft.validate() {
            Err(AppError::Validation(v)) => {
                assert!(v.for_field("daysOfWeek").is_some());
                assert!(v.for_field("timeOfDay").is_some());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn next_occurrence_from_cron() {
        let schedule = Schedule {
            id: "s1".into(),
            scraper_id: "1".into(),
            name: "nightly".into(),
            cron_expression: Some("30 2 * * *".into()),
            days_of_week: vec![],
            time_of_day: None,
            last_run: None,
            next_run: None,
            active: true,
        };
        // 2024-05-01 is a Wednesday
        let next = schedule.next_occurrence(at(2024, 5, 1, 3, 0)).unwrap();
        assert_eq!(next, at(2024, 5, 2, 2, 30));
    }

    #[test]
    fn next_occurrence_from_days_and_time() {
        let mut schedule = Schedule {
            id: "s2".into(),
            scraper_id: "1".into(),
            name: "weekly".into(),
            cron_expression: None,
            days_of_week: vec![Weekday::Mon, Weekday::Wed],
            time_of_day: Some("09:15".into()),
            last_run: None,
            next_run: None,
            active: true,
        };

        // Wednesday before 09:15 runs the same day
        assert_eq!(
            schedule.next_occurrence(at(2024, 5, 1, 8, 0)),
            Some(at(2024, 5, 1, 9, 15))
        );
        // Wednesday after 09:15 rolls to Monday
        assert_eq!(
            schedule.next_occurrence(at(2024, 5, 1, 10, 0)),
            Some(at(2024, 5, 6, 9, 15))
        );

        schedule.active = false;
        assert_eq!(schedule.next_occurrence(at(2024, 5, 1, 8, 0)), None);
    }
}
