//! Adaptive polling of scraper state.
//!
//! Each observed scraper gets one task per [`Resource`]. The tasks share a
//! [`ScraperView`] and re-time themselves whenever the status poll observes
//! the scraper start or stop.

pub mod hub;
pub mod policy;
pub mod query;
pub mod view;
pub mod watch;

pub use hub::{PollingHub, Subscription};
pub use policy::{PollingPolicy, Resource};
pub use query::Query;
pub use view::ScraperView;
pub use watch::Visibility;
