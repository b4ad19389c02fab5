//! Calendar export: one recurring VEVENT per event.
//!
//! Repetition is left to the calendar client, so every event becomes exactly one entry carrying
//! its anchor and its rule.

use std::sync::LazyLock;

use chrono::Duration;
use ical::{
    generator::{Emitter, IcalCalendar, IcalCalendarBuilder, IcalEvent, Property},
    ical_param, ical_property,
};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{Error, Result},
    event::{sorted_by_id, RawEvent},
    recurrence::{Anchor, Recurrence, Zone},
};

static DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

static ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
            ^\s*
            (?P<name>[^<>()]*?) # the display name, may be empty
            \s*
            (?:
                <\s*(?P<angled>[^<>\s]+)\s*> # Name <contact>
                |
                \(\s*(?P<parenthesized>[^()\s]+)\s*\) # Name (contact)
            )
            \s*$
        ",
    )
    .unwrap()
});
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s<>()]+@[^@\s<>()]+\.[^@\s<>()]+$").unwrap());
static URI_SCHEMES: [&str; 4] = ["mailto:", "http://", "https://", "tel:"];

/// A calendar user, as used by `ORGANIZER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarAddress {
    pub common_name: Option<String>,
    /// A URI like `mailto:info@aalen.de`.
    pub address: String,
}

impl CalendarAddress {
    /// Parse `Name <contact>`, `Name (contact)` or a bare contact.
    ///
    /// The contact is either a URI or an e-mail address.
    pub fn parse(value: &str) -> Result<Self> {
        let malformed = || Error::UnparsableField {
            field: "organiser",
            value: String::from(value),
        };
        let (name, contact) = match ADDRESS_REGEX.captures(value) {
            Some(captures) => {
                let contact = captures
                    .name("angled")
                    .or_else(|| captures.name("parenthesized"))
                    .ok_or_else(malformed)?
                    .as_str();
                let name = captures
                    .name("name")
                    .map(|name| name.as_str())
                    .filter(|name| !name.is_empty());
                (name, contact)
            }
            None => (None, value.trim()),
        };
        let address = normalize_contact(contact).ok_or_else(malformed)?;
        Ok(Self {
            common_name: name.map(String::from),
            address,
        })
    }
}

fn normalize_contact(contact: &str) -> Option<String> {
    let lowercase = contact.to_lowercase();
    if URI_SCHEMES
        .iter()
        .any(|scheme| lowercase.starts_with(scheme) && lowercase.len() > scheme.len())
    {
        return Some(String::from(contact));
    }
    EMAIL_REGEX
        .is_match(contact)
        .then(|| format!("mailto:{contact}"))
}

/// One calendar entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarRecord {
    pub id: u64,
    pub uid: String,
    pub summary: Option<String>,
    pub start: Anchor,
    pub rule: String,
    pub url: Option<String>,
    /// Mirrors the url.
    pub description: Option<String>,
    pub location: Option<String>,
    pub organizer: Option<CalendarAddress>,
    pub duration: Option<Duration>,
}

impl CalendarRecord {
    /// Build the entry of a single event.
    ///
    /// Fails only if the recurrence is unparsable. Malformed optional fields are left out.
    pub fn from_event(event: &RawEvent, config: &Config) -> Result<Self> {
        let recurrence = Recurrence::parse(&event.rule, config.timezone)?;
        let (start, rule) = recurrence.as_rule();
        let organizer = event
            .organiser
            .as_deref()
            .and_then(|organiser| match CalendarAddress::parse(organiser) {
                Ok(address) => Some(address),
                Err(err) => {
                    debug!(id = event.id, "omitting organizer: {err}");
                    None
                }
            });
        let duration = match (&event.time_start, &event.time_end) {
            (Some(time_start), Some(time_end)) => match duration(time_start, time_end) {
                Ok(duration) => Some(duration),
                Err(err) => {
                    debug!(id = event.id, "omitting duration: {err}");
                    None
                }
            },
            _ => None,
        };
        Ok(Self {
            id: event.id,
            uid: uid(event.id),
            summary: event.title.clone(),
            start: *start,
            rule: String::from(rule),
            url: event.url.clone(),
            description: event.url.clone(),
            location: event.location.clone(),
            organizer,
            duration,
        })
    }

    fn to_ical_event(&self) -> IcalEvent {
        let mut event = IcalEvent::new();
        let properties = &mut event.properties;
        properties.push(ical_property!("UID", &self.uid));
        if let Some(summary) = &self.summary {
            properties.push(ical_property!("SUMMARY", escape_text(summary)));
        }
        let start = self.start.local.format(DATE_TIME_FORMAT).to_string();
        properties.push(match self.start.zone {
            Zone::Utc => ical_property!("DTSTART", format!("{start}Z")),
            Zone::Named(tz) => ical_property!("DTSTART", start, ical_param!("TZID", tz.name())),
        });
        properties.push(ical_property!("RRULE", &self.rule));
        if let Some(url) = &self.url {
            properties.push(ical_property!("URL", url));
        }
        if let Some(description) = &self.description {
            properties.push(ical_property!("DESCRIPTION", escape_text(description)));
        }
        if let Some(location) = &self.location {
            properties.push(ical_property!("LOCATION", escape_text(location)));
        }
        if let Some(organizer) = &self.organizer {
            properties.push(match &organizer.common_name {
                Some(name) => ical_property!(
                    "ORGANIZER",
                    &organizer.address,
                    ical_param!("CN", name)
                ),
                None => ical_property!("ORGANIZER", &organizer.address),
            });
        }
        if let Some(duration) = self.duration {
            properties.push(ical_property!("DURATION", format_duration(duration)));
        }
        event
    }
}

/// Build the entries of all events, ordered by id.
///
/// Events with an unparsable recurrence are skipped.
pub fn build_records(events: &[RawEvent], config: &Config) -> Vec<CalendarRecord> {
    let records: Vec<CalendarRecord> = sorted_by_id(events)
        .into_iter()
        .filter_map(|event| match CalendarRecord::from_event(event, config) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(id = event.id, "skipping event: {err}");
                None
            }
        })
        .collect();
    info!(
        records = records.len(),
        skipped = events.len() - records.len(),
        "built calendar records"
    );
    records
}

/// Build the calendar holding the given entries in their order.
pub fn to_ical(records: &[CalendarRecord], config: &Config) -> IcalCalendar {
    let mut calendar = IcalCalendarBuilder::version("2.0")
        .gregorian()
        .prodid(config.prod_id.clone())
        .build();
    calendar
        .events
        .extend(records.iter().map(CalendarRecord::to_ical_event));
    calendar
}

/// Serialize the calendar holding the given entries.
pub fn generate(records: &[CalendarRecord], config: &Config) -> String {
    to_ical(records, config).generate()
}

/// Get the unique id of an event.
///
/// Changing this function is a breaking change!
fn uid(id: u64) -> String {
    format!("aalen-event-{id}@aalen.de")
}

/// Parse a time of day like `8:30` into the offset from midnight.
///
/// Components after the minutes are ignored.
pub fn parse_time_of_day(value: &str) -> Result<Duration> {
    let malformed = || Error::UnparsableField {
        field: "time",
        value: String::from(value),
    };
    let mut parts = value.split(':');
    let (Some(hours), Some(minutes)) = (parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let hours: i64 = hours.trim().parse().map_err(|_| malformed())?;
    let minutes: i64 = minutes.trim().parse().map_err(|_| malformed())?;
    Duration::try_hours(hours)
        .zip(Duration::try_minutes(minutes))
        .and_then(|(hours, minutes)| hours.checked_add(&minutes))
        .ok_or_else(malformed)
}

/// The duration between two times of day. Negative if `end` is before `start`.
pub fn duration(start: &str, end: &str) -> Result<Duration> {
    parse_time_of_day(end)?
        .checked_sub(&parse_time_of_day(start)?)
        .ok_or_else(|| Error::UnparsableField {
            field: "time",
            value: format!("{start} - {end}"),
        })
}

/// Format a duration as an iCalendar `DURATION` value.
fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes();
    let sign = if minutes < 0 { "-" } else { "" };
    let minutes = minutes.abs();
    match (minutes / 60, minutes % 60) {
        (0, 0) => String::from("PT0S"),
        (hours, 0) => format!("{sign}PT{hours}H"),
        (0, minutes) => format!("{sign}PT{minutes}M"),
        (hours, minutes) => format!("{sign}PT{hours}H{minutes}M"),
    }
}

/// Escape a TEXT value.
fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            character => escaped.push(character),
        }
    }
    escaped
}
