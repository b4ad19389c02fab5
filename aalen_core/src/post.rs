//! Markdown posts: one file per event occurrence.
//!
//! Posts live at `<root>/<year>/<month>/<day>/<slug>.md` and start with a YAML front matter.
//! Existing posts are kept unless overwriting is requested, so repeated runs only add what is
//! missing. Posts of different events with the same slug on the same day replace each other.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, FixedOffset};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{Error, Result},
    event::{sorted_by_id, RawEvent},
    recurrence::{ExpansionBound, Recurrence},
};

static ALL_DAY_START: &str = "00:00";
static ALL_DAY_END: &str = "23:59";
static DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// The content of a single post.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDocument {
    pub title: String,
    pub author: String,
    pub thumbnail: String,
    pub category: String,
    pub date: DateTime<FixedOffset>,
    pub featured: bool,
    pub canceled: Option<bool>,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub url: Option<String>,
}

impl PostDocument {
    pub fn new(event: &RawEvent, occurrence: &DateTime<rrule::Tz>, config: &Config) -> Self {
        let (start_time, end_time) = event.valid_times().unwrap_or((ALL_DAY_START, ALL_DAY_END));
        Self {
            title: event.title.clone().unwrap_or_default(),
            author: event.organiser.clone().unwrap_or_default(),
            thumbnail: String::from(
                event
                    .thumbnail()
                    .unwrap_or(config.thumbnail_placeholder.as_str()),
            ),
            category: String::from(
                event
                    .category_title()
                    .unwrap_or(config.category_placeholder.as_str()),
            ),
            date: occurrence.fixed_offset(),
            featured: event.featured(),
            canceled: event.canceled,
            location: event.location.clone().unwrap_or_default(),
            start_time: String::from(start_time),
            end_time: String::from(end_time),
            url: event.url.clone(),
        }
    }

    /// Render the front matter and the body.
    pub fn render(&self) -> String {
        let mut document = String::from("---\n");
        document.push_str(&format!("title: {}\n", quote(&self.title)));
        document.push_str(&format!("author: {}\n", quote(&self.author)));
        document.push_str(&format!("thumbnail: {}\n", quote(&self.thumbnail)));
        document.push_str(&format!("categories:\n  - {}\n", quote(&self.category)));
        document.push_str(&format!("date: {}\n", self.date.format(DATE_FORMAT)));
        document.push_str(&format!("featured: {}\n", self.featured));
        match self.canceled {
            Some(canceled) => document.push_str(&format!("canceled: {canceled}\n")),
            None => document.push_str("canceled:\n"),
        }
        document.push_str(&format!("location: {}\n", quote(&self.location)));
        document.push_str(&format!("starttime: {}\n", quote(&self.start_time)));
        document.push_str(&format!("endtime: {}\n", quote(&self.end_time)));
        document.push_str(&format!("expireDate: {}\n", quote(&self.end_time)));
        document.push_str("---\n");
        if let Some(url) = &self.url {
            document.push_str(&format!("[Mehr Details]({url})\n"));
        }
        document
    }
}

/// A single-quoted YAML scalar.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Get the path of the post of an event occurrence.
///
/// Changing this function is a breaking change!
pub fn post_path(root: &Path, event: &RawEvent, occurrence: &DateTime<rrule::Tz>) -> PathBuf {
    let date = occurrence.date_naive();
    let mut slug = slug::slugify(event.title.as_deref().unwrap_or_default());
    if slug.is_empty() {
        slug = format!("event-{}", event.id);
    }
    root.join(date.year().to_string())
        .join(date.month().to_string())
        .join(date.day().to_string())
        .join(format!("{slug}.md"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Replace posts which already exist.
    pub overwrite: bool,
    pub bound: ExpansionBound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub written: usize,
    /// Posts which already existed.
    pub skipped: usize,
    /// Events with an unparsable recurrence.
    pub events_skipped: usize,
}

/// Write the posts of all events below `root`.
///
/// Events are processed by ascending id. Any failure to write a post aborts the run.
pub fn materialize(
    root: &Path,
    events: &[RawEvent],
    config: &Config,
    options: &MaterializeOptions,
) -> Result<MaterializeReport> {
    let mut report = MaterializeReport::default();
    for event in sorted_by_id(events) {
        let recurrence = match Recurrence::parse(&event.rule, config.timezone) {
            Ok(recurrence) => recurrence,
            Err(err) => {
                warn!(id = event.id, "skipping event: {err}");
                report.events_skipped += 1;
                continue;
            }
        };
        for occurrence in recurrence.occurrences(&options.bound) {
            let path = post_path(root, event, &occurrence);
            if !options.overwrite && path.exists() {
                debug!(id = event.id, path = %path.display(), "post exists");
                report.skipped += 1;
                continue;
            }
            let document = PostDocument::new(event, &occurrence, config);
            write(&path, &document.render())?;
            report.written += 1;
        }
    }
    info!(
        written = report.written,
        skipped = report.skipped,
        events_skipped = report.events_skipped,
        "materialized posts"
    );
    Ok(report)
}

fn write(path: &Path, content: &str) -> Result<()> {
    let filesystem_write = |source| Error::FilesystemWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(filesystem_write)?;
    }
    fs::write(path, content).map_err(filesystem_write)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use serde_json::json;

    use crate::{
        client::parse,
        config::Config,
        error::Error,
        event::RawEvent,
        post::{materialize, MaterializeOptions, MaterializeReport},
        recurrence::ExpansionBound,
    };

    static PAYLOAD: &str = include_str!("client/tests/events.json");

    fn markt() -> RawEvent {
        serde_json::from_value(json!({
            "id": 1,
            "rule": "DTSTART:20240101T100000\nRRULE:FREQ=WEEKLY;COUNT=3",
            "title": "Markt"
        }))
        .unwrap()
    }

    fn count_files(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .map(|path| if path.is_dir() { count_files(&path) } else { 1 })
            .sum()
    }

    #[test]
    fn test_weekly_posts() {
        let root = tempfile::tempdir().unwrap();
        let report = materialize(
            root.path(),
            &[markt()],
            &Config::default(),
            &MaterializeOptions::default(),
        )
        .unwrap();
        assert_eq!(
            report,
            MaterializeReport {
                written: 3,
                skipped: 0,
                events_skipped: 0
            }
        );
        for day in [1, 8, 15] {
            assert!(root.path().join(format!("2024/1/{day}/markt.md")).is_file());
        }
        let post = fs::read_to_string(root.path().join("2024/1/1/markt.md")).unwrap();
        assert_eq!(
            post,
            "---\n\
             title: 'Markt'\n\
             author: ''\n\
             thumbnail: '/images/placeholder.png'\n\
             categories:\n  - 'Keine'\n\
             date: 2024-01-01T10:00:00+01:00\n\
             featured: false\n\
             canceled:\n\
             location: ''\n\
             starttime: '00:00'\n\
             endtime: '23:59'\n\
             expireDate: '23:59'\n\
             ---\n"
        );
    }

    #[test]
    fn test_post_fields() {
        let root = tempfile::tempdir().unwrap();
        let events = parse(PAYLOAD).unwrap();
        let options = MaterializeOptions {
            overwrite: false,
            bound: ExpansionBound {
                until: None,
                max_occurrences: 2,
            },
        };
        let report = materialize(root.path(), &events, &Config::default(), &options).unwrap();
        assert_eq!(report.events_skipped, 2);
        assert_eq!(report.written, 2 + 2 + 2 + 2 + 2);

        let post = fs::read_to_string(
            root.path()
                .join("2024/1/5/offene-buhne-im-kulturbahnhof.md"),
        )
        .unwrap();
        assert_eq!(
            post,
            "---\n\
             title: 'Offene Bühne im Kulturbahnhof'\n\
             author: 'Kulturbahnhof Aalen (kultur@aalen.de)'\n\
             thumbnail: 'https://www.aalen.de/images/buehne_1230.jpg'\n\
             categories:\n  - 'Kultur'\n\
             date: 2024-01-05T19:00:00+01:00\n\
             featured: true\n\
             canceled: false\n\
             location: 'Kulturbahnhof, Bahnhofstraße 81'\n\
             starttime: '19:00'\n\
             endtime: '22:00'\n\
             expireDate: '22:00'\n\
             ---\n\
             [Mehr Details](https://www.aalen.de/offene-buehne)\n"
        );
        assert!(root
            .path()
            .join("2024/2/2/offene-buhne-im-kulturbahnhof.md")
            .is_file());

        let fest = fs::read_to_string(root.path().join("2025/3/16/fruhlingsfest.md")).unwrap();
        assert!(fest.contains("canceled: true\n"));
        assert!(fest.contains("starttime: '00:00'\n"));
        assert!(fest.contains("categories:\n  - 'Keine'\n"));
        assert!(fest.contains("date: 2025-03-16T14:00:00+01:00\n"));
        assert!(!fest.contains("[Mehr Details]"));
    }

    #[test]
    fn test_until_posts() {
        let root = tempfile::tempdir().unwrap();
        let events: Vec<RawEvent> = parse(PAYLOAD)
            .unwrap()
            .into_iter()
            .filter(|event| event.id == 6 || event.id == 7)
            .collect();
        let report = materialize(
            root.path(),
            &events,
            &Config::default(),
            &MaterializeOptions::default(),
        )
        .unwrap();
        assert_eq!(report.written, 5 + 3);
        for day in [1, 8, 15, 22, 29] {
            assert!(root.path().join(format!("2024/1/{day}/lauftreff.md")).is_file());
        }
        for day in [2, 9, 16] {
            assert!(root.path().join(format!("2024/1/{day}/seniorencafe.md")).is_file());
        }
        assert!(!root.path().join("2024/1/23/seniorencafe.md").exists());
        assert_eq!(count_files(root.path()), 8);
    }

    #[test]
    fn test_until_before_start_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let event: RawEvent = serde_json::from_value(json!({
            "id": 1,
            "rule": "DTSTART:20240101T100000\nRRULE:FREQ=WEEKLY;UNTIL=20231231",
            "title": "Markt"
        }))
        .unwrap();
        let report = materialize(
            root.path(),
            &[event],
            &Config::default(),
            &MaterializeOptions::default(),
        )
        .unwrap();
        assert_eq!(report, MaterializeReport::default());
        assert_eq!(count_files(root.path()), 0);
    }

    #[test]
    fn test_unparsable_rule_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let event: RawEvent =
            serde_json::from_value(json!({"id": 1, "rule": "bad", "title": "Markt"})).unwrap();
        let report = materialize(
            root.path(),
            &[event],
            &Config::default(),
            &MaterializeOptions::default(),
        )
        .unwrap();
        assert_eq!(report.events_skipped, 1);
        assert_eq!(count_files(root.path()), 0);
    }

    #[test]
    fn test_idempotent_without_overwrite() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::default();
        let options = MaterializeOptions::default();
        materialize(root.path(), &[markt()], &config, &options).unwrap();
        let path = root.path().join("2024/1/8/markt.md");
        fs::write(&path, "edited").unwrap();

        let report = materialize(root.path(), &[markt()], &config, &options).unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(fs::read_to_string(&path).unwrap(), "edited");

        let options = MaterializeOptions {
            overwrite: true,
            ..options
        };
        let report = materialize(root.path(), &[markt()], &config, &options).unwrap();
        assert_eq!(report.written, 3);
        assert!(fs::read_to_string(&path).unwrap().starts_with("---\n"));
    }

    #[test]
    fn test_renamed_event_leaves_old_posts() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::default();
        let options = MaterializeOptions {
            overwrite: true,
            ..MaterializeOptions::default()
        };
        materialize(root.path(), &[markt()], &config, &options).unwrap();
        let renamed = RawEvent {
            title: Some(String::from("Bauernmarkt")),
            ..markt()
        };
        materialize(root.path(), &[renamed], &config, &options).unwrap();
        assert!(root.path().join("2024/1/1/markt.md").is_file());
        assert!(root.path().join("2024/1/1/bauernmarkt.md").is_file());
        assert_eq!(count_files(root.path()), 6);
    }

    #[test]
    fn test_unterminated_rule_is_bounded() {
        let root = tempfile::tempdir().unwrap();
        let event: RawEvent = serde_json::from_value(json!({
            "id": 1,
            "rule": "DTSTART:20240101T100000\nRRULE:FREQ=DAILY",
            "title": "Täglich"
        }))
        .unwrap();
        let options = MaterializeOptions {
            overwrite: false,
            bound: ExpansionBound {
                until: None,
                max_occurrences: 5,
            },
        };
        let report = materialize(root.path(), &[event], &Config::default(), &options).unwrap();
        assert_eq!(report.written, 5);
        assert!(root.path().join("2024/1/5/taglich.md").is_file());
    }

    #[test]
    fn test_quotes_and_missing_title() {
        let root = tempfile::tempdir().unwrap();
        let event: RawEvent = serde_json::from_value(json!({
            "id": 42,
            "rule": "DTSTART:20240101T100000\nRRULE:FREQ=DAILY;COUNT=1",
            "location": "Kino 'Am Kocher'"
        }))
        .unwrap();
        materialize(
            root.path(),
            &[event],
            &Config::default(),
            &MaterializeOptions::default(),
        )
        .unwrap();
        let post = fs::read_to_string(root.path().join("2024/1/1/event-42.md")).unwrap();
        assert!(post.contains("title: ''\n"));
        assert!(post.contains("location: 'Kino ''Am Kocher'''\n"));
    }

    #[test]
    fn test_write_failure_propagates() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("2024");
        fs::write(&blocker, "not a directory").unwrap();
        let result = materialize(
            root.path(),
            &[markt()],
            &Config::default(),
            &MaterializeOptions::default(),
        );
        assert!(matches!(result, Err(Error::FilesystemWrite { .. })));
    }
}
