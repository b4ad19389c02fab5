//! Errors of the event pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The events could not be retrieved or decoded.
    #[error("could not fetch events: {0}")]
    Fetch(String),

    /// The `rule` field of an event is malformed. The event is skipped.
    #[error("unparsable recurrence: {0}")]
    UnparsableRecurrence(String),

    /// An optional field is malformed. The field is omitted.
    #[error("unparsable field `{field}`: {value:?}")]
    UnparsableField { field: &'static str, value: String },

    #[error("could not write {}: {source}", path.display())]
    FilesystemWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
