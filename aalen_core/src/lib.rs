//! This crate converts the recurring events of the city of Aalen into an iCalendar feed
//! or into one Markdown post per event occurrence.
//!
//! The events are read from <https://www.aalen.de/api/EventApiRules.php>.

pub use ical;

pub mod calendar;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod post;
pub mod recurrence;

pub use config::Config;
pub use error::{Error, Result};
