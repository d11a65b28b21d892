pub mod analytics;
pub mod log_entry;
pub mod notification;
pub mod schedule;
pub mod scraper;
pub mod status;
