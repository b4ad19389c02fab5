//! This client fetches the event payload and decodes it into raw events.

use std::{path::Path, time::Duration};

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{Error, Result},
    event::RawEvent,
};

static TIMEOUT: Duration = Duration::from_secs(30);

/// Get all events from the API.
pub async fn fetch(config: &Config) -> Result<Vec<RawEvent>> {
    let client = reqwest::Client::builder()
        .timeout(TIMEOUT)
        .build()
        .map_err(|err| Error::Fetch(err.to_string()))?;
    let response = client
        .get(&config.api_url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| Error::Fetch(err.to_string()))?;
    let body = response
        .text()
        .await
        .map_err(|err| Error::Fetch(err.to_string()))?;
    let events = parse(&body)?;
    info!(count = events.len(), url = %config.api_url, "fetched events");
    Ok(events)
}

/// Read the events from a local file holding an API payload.
pub fn read(path: &Path) -> Result<Vec<RawEvent>> {
    let body = std::fs::read_to_string(path)
        .map_err(|err| Error::Fetch(format!("{}: {err}", path.display())))?;
    let events = parse(&body)?;
    info!(count = events.len(), path = %path.display(), "read events");
    Ok(events)
}

/// Decode an API payload.
///
/// The payload must be a list. Records without a usable `id` or `rule` are skipped.
pub fn parse(json: &str) -> Result<Vec<RawEvent>> {
    let records: Vec<Value> = serde_json::from_str(json)
        .map_err(|err| Error::Fetch(format!("invalid payload: {err}")))?;
    let events = records
        .into_iter()
        .enumerate()
        .filter_map(
            |(index, record)| match serde_json::from_value::<RawEvent>(record) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(index, "skipping record: {err}");
                    None
                }
            },
        )
        .collect();
    Ok(events)
}
