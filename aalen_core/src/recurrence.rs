//! Recurrence interpretation of the `rule` field.
//!
//! The field holds two lines, e.g.
//!
//! ```text
//! DTSTART:20240101T100000
//! RRULE:FREQ=WEEKLY;COUNT=3
//! ```
//!
//! The first line is the anchor, the second the repetition rule. The anchor is interpreted in the
//! `TZID` of its line if it names a known zone, in UTC if it ends in `Z`, and in the configured
//! zone otherwise.
//!
//! An `UNTIL` without `Z` is read in the zone of the anchor and rewritten as a UTC instant, as
//! required next to a zoned `DTSTART`. A date-only `UNTIL` means midnight of that day.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rrule::{RRule, RRuleSet, Unvalidated};

use crate::error::{Error, Result};

static DATE_TIME_FORMATS: [&str; 2] = ["%Y%m%dT%H%M%S", "%Y%m%dT%H%M"];
static DATE_FORMAT: &str = "%Y%m%d";
static UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// The safeguard against unterminated rules.
pub static MAX_OCCURRENCES: usize = 1000;

/// The zone an anchor is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Utc,
    Named(chrono_tz::Tz),
}

impl From<chrono_tz::Tz> for Zone {
    fn from(tz: chrono_tz::Tz) -> Self {
        if tz == chrono_tz::UTC || tz == chrono_tz::Etc::UTC {
            Zone::Utc
        } else {
            Zone::Named(tz)
        }
    }
}

/// The first instant of a recurrence, as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub local: NaiveDateTime,
    pub zone: Zone,
}

/// Limits how far [`Recurrence::occurrences`] is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionBound {
    /// The last instant which may still be produced.
    pub until: Option<DateTime<Utc>>,
    pub max_occurrences: usize,
}

impl Default for ExpansionBound {
    fn default() -> Self {
        Self {
            until: None,
            max_occurrences: MAX_OCCURRENCES,
        }
    }
}

impl ExpansionBound {
    /// A bound ending `days` days after `now`.
    pub fn horizon(now: DateTime<Utc>, days: i64, max_occurrences: usize) -> Self {
        Self {
            until: Some(now + Duration::days(days)),
            max_occurrences,
        }
    }
}

/// A parsed `rule` field.
#[derive(Debug, Clone)]
pub struct Recurrence {
    anchor: Anchor,
    rule: String,
    /// `None` if `UNTIL` lies before the anchor.
    set: Option<RRuleSet>,
}

impl Recurrence {
    /// Parse the `rule` field of an event.
    ///
    /// A field which does not consist of exactly two colon-bearing lines, an unreadable start or
    /// an invalid rule yield [`Error::UnparsableRecurrence`]. A rule ending before its anchor is
    /// valid and has no occurrences.
    pub fn parse(field: &str, default_zone: chrono_tz::Tz) -> Result<Self> {
        let lines: Vec<&str> = field
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        let [start_line, rule_line] = lines[..] else {
            return Err(Error::UnparsableRecurrence(format!(
                "expected 2 lines, found {}",
                lines.len()
            )));
        };
        let (start_name, start_token) = split_line(start_line)?;
        let (_, rule_token) = split_line(rule_line)?;
        let anchor = parse_anchor(start_name, start_token, default_zone)?;
        let dt_start = anchor.to_datetime().ok_or_else(|| {
            Error::UnparsableRecurrence(format!(
                "{} does not exist in {:?}",
                anchor.local, anchor.zone
            ))
        })?;
        let (rule, until) = normalize_until(rule_token.trim(), &anchor)?;
        let build = |rule: &str| {
            RRule::<Unvalidated>::from_str(rule)
                .and_then(|parsed| parsed.build(dt_start.clone()))
                .map_err(|err| Error::UnparsableRecurrence(format!("{rule:?}: {err}")))
        };
        let set = match until {
            Some(until) if until < dt_start.with_timezone(&Utc) => {
                let open: Vec<&str> = rule.split(';').filter(|part| !is_until(part)).collect();
                build(&open.join(";"))?;
                None
            }
            _ => Some(build(&rule)?),
        };
        Ok(Self { anchor, rule, set })
    }

    /// The anchor and the rule, for formats which repeat events themselves.
    pub fn as_rule(&self) -> (&Anchor, &str) {
        (&self.anchor, &self.rule)
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    /// The instants of the recurrence, starting at the anchor.
    ///
    /// The sequence is lazy and stops at `bound`, even for rules without `COUNT` or `UNTIL`.
    pub fn occurrences(
        &self,
        bound: &ExpansionBound,
    ) -> impl Iterator<Item = DateTime<rrule::Tz>> + '_ {
        let until = bound.until;
        self.set
            .iter()
            .flat_map(|set| set.into_iter())
            .take_while(move |occurrence| {
                until.map_or(true, |until| occurrence.with_timezone(&Utc) <= until)
            })
            .take(bound.max_occurrences)
    }
}

impl Anchor {
    /// The anchor as an instant.
    ///
    /// Local times skipped by a daylight saving transition do not exist and are rejected.
    pub fn to_datetime(&self) -> Option<DateTime<rrule::Tz>> {
        let tz: rrule::Tz = match self.zone {
            Zone::Utc => Utc.into(),
            Zone::Named(tz) => tz.into(),
        };
        tz.from_local_datetime(&self.local).earliest()
    }
}

/// Split a content line into the name with its parameters and the value.
fn split_line(line: &str) -> Result<(&str, &str)> {
    line.split_once(':')
        .ok_or_else(|| Error::UnparsableRecurrence(format!("no value in line {line:?}")))
}

/// Parse a `DATE-TIME` or `DATE` value. The flag tells whether it ends in `Z`.
fn parse_value(token: &str) -> Option<(NaiveDateTime, bool)> {
    let token = token.trim();
    let (token, utc) = match token.strip_suffix('Z') {
        Some(token) => (token, true),
        None => (token, false),
    };
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(token, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(token, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|local| (local, utc))
}

fn is_until(part: &str) -> bool {
    part.split_once('=')
        .is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case("UNTIL"))
}

/// Rewrite the `UNTIL` of a rule as a UTC instant.
fn normalize_until(rule: &str, anchor: &Anchor) -> Result<(String, Option<DateTime<Utc>>)> {
    let mut until = None;
    let mut parts = Vec::new();
    for part in rule.split(';') {
        let Some((_, value)) = part.split_once('=').filter(|_| is_until(part)) else {
            parts.push(String::from(part));
            continue;
        };
        let invalid = || Error::UnparsableRecurrence(format!("invalid until {value:?}"));
        let (local, utc) = parse_value(value).ok_or_else(invalid)?;
        let instant = if utc {
            Utc.from_utc_datetime(&local)
        } else {
            Anchor {
                local,
                zone: anchor.zone,
            }
            .to_datetime()
            .ok_or_else(invalid)?
            .with_timezone(&Utc)
        };
        parts.push(format!("UNTIL={}", instant.format(UTC_FORMAT)));
        until = Some(instant);
    }
    Ok((parts.join(";"), until))
}

fn parse_anchor(name: &str, token: &str, default_zone: chrono_tz::Tz) -> Result<Anchor> {
    let (local, utc) = parse_value(token)
        .ok_or_else(|| Error::UnparsableRecurrence(format!("invalid start {:?}", token.trim())))?;
    let tzid = name.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.eq_ignore_ascii_case("TZID")
            .then(|| value.trim_matches('"').parse::<chrono_tz::Tz>().ok())
            .flatten()
    });
    let zone = match (tzid, utc) {
        (Some(tz), _) => Zone::from(tz),
        (None, true) => Zone::Utc,
        (None, false) => Zone::from(default_zone),
    };
    Ok(Anchor { local, zone })
}
