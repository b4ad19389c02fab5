//! Settings shared by the pipelines.
//!
//! A [`Config`] is built once at startup and handed to every component that needs it.

use chrono_tz::Tz;

pub static API_URL: &str = "https://www.aalen.de/api/EventApiRules.php";
pub static PROD_ID: &str = "-//Aalen2ics//https://github.com/dadav/aalen2ics//";
pub static TIMEZONE: Tz = chrono_tz::Europe::Berlin;
pub static THUMBNAIL_PLACEHOLDER: &str = "/images/placeholder.png";
pub static CATEGORY_PLACEHOLDER: &str = "Keine";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where the event payload is fetched from.
    pub api_url: String,
    /// The `PRODID` of the generated calendar.
    pub prod_id: String,
    /// The zone of start times which do not carry their own.
    pub timezone: Tz,
    pub thumbnail_placeholder: String,
    pub category_placeholder: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::from(API_URL),
            prod_id: String::from(PROD_ID),
            timezone: TIMEZONE,
            thumbnail_placeholder: String::from(THUMBNAIL_PLACEHOLDER),
            category_placeholder: String::from(CATEGORY_PLACEHOLDER),
        }
    }
}
