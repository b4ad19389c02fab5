//! The event model of the remote API.
//!
//! The API is loosely typed: flags come as booleans, numbers or strings, and nested objects are
//! replaced by `null`, `false` or an empty array when they are missing. Every field is decoded
//! leniently into an explicit `Option`, so an odd optional field never drops its record.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

/// One event record as delivered by the API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(deserialize_with = "id")]
    pub id: u64,
    /// A `DTSTART` line and an `RRULE` line.
    pub rule: String,
    #[serde(default, deserialize_with = "text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub location: Option<String>,
    /// A display name and a contact in one string.
    #[serde(default, deserialize_with = "text")]
    pub organiser: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub time_start: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub time_end: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub time_valid: Option<bool>,
    #[serde(default, deserialize_with = "nested")]
    pub image: Option<Image>,
    #[serde(default, deserialize_with = "nested")]
    pub category: Option<Category>,
    #[serde(default, deserialize_with = "flag")]
    pub highlight: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub topevent: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub canceled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "text")]
    pub thumb_1230px: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub thumb_600px: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub thumb_300px: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Category {
    #[serde(default, deserialize_with = "text")]
    pub title: Option<String>,
}

impl RawEvent {
    /// Whether the event is highlighted in any way.
    pub fn featured(&self) -> bool {
        self.highlight.unwrap_or(false) || self.topevent.unwrap_or(false)
    }

    /// The start and end time of day, if the source marks them as valid.
    pub fn valid_times(&self) -> Option<(&str, &str)> {
        match (self.time_valid, &self.time_start, &self.time_end) {
            (Some(true), Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.image.as_ref()?.thumb_1230px.as_deref()
    }

    pub fn category_title(&self) -> Option<&str> {
        self.category.as_ref()?.title.as_deref()
    }
}

/// Sort events by ascending id, keeping the payload order of equal ids.
pub fn sorted_by_id(events: &[RawEvent]) -> Vec<&RawEvent> {
    let mut sorted: Vec<&RawEvent> = events.iter().collect();
    sorted.sort_by_key(|event| event.id);
    sorted
}

fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid id {number}"))),
        Value::String(string) => string
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id {string:?}"))),
        other => Err(serde::de::Error::custom(format!("invalid id {other}"))),
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(string) if string.is_empty() => None,
        Value::String(string) => Some(string),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::Bool(flag) => Some(flag),
        Value::Number(number) => Some(number.as_f64().is_some_and(|number| number != 0.0)),
        Value::String(string) => Some(matches!(
            string.trim().to_lowercase().as_str(),
            "1" | "true" | "yes"
        )),
        _ => Some(false),
    })
}

fn nested<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
