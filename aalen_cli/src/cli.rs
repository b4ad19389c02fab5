//! This module implements the command line interface.

use std::{
    fs::{create_dir_all, write},
    io::{stdout, Write},
    path::PathBuf,
};

use aalen_core::{
    calendar, client,
    config::{self, Config},
    event::RawEvent,
    post::{self, MaterializeOptions},
    recurrence::{self, ExpansionBound},
};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Arguments {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// the API endpoint the events are fetched from
    #[arg(long, global = true, env = "AALEN_API_URL", default_value = config::API_URL)]
    pub url: String,
    /// the zone of start times without an explicit zone
    #[arg(long, global = true, default_value_t = config::TIMEZONE)]
    pub timezone: chrono_tz::Tz,
    /// read the events from a JSON file instead of fetching them
    #[arg(long, global = true)]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write all events as an iCalendar file.
    Ics {
        /// the output file, standard output if omitted
        output: Option<PathBuf>,
    },
    /// Write one Markdown post per event occurrence.
    Posts {
        /// the root directory of the posts
        output: PathBuf,
        /// replace posts which already exist
        #[arg(long)]
        overwrite: bool,
        /// expand occurrences up to this many days from now
        #[arg(long, default_value_t = 365)]
        horizon_days: i64,
        /// expand at most this many occurrences per event
        #[arg(long, default_value_t = recurrence::MAX_OCCURRENCES)]
        max_occurrences: usize,
    },
}

impl From<&SourceArgs> for Config {
    fn from(value: &SourceArgs) -> Self {
        Self {
            api_url: value.url.clone(),
            timezone: value.timezone,
            ..Config::default()
        }
    }
}

pub async fn run(args: Arguments) -> Result<()> {
    let config = Config::from(&args.source);
    let events = load_events(&args.source, &config).await?;
    match args.command {
        Command::Ics { output } => run_ics(&events, &config, output)?,
        Command::Posts {
            output,
            overwrite,
            horizon_days,
            max_occurrences,
        } => {
            let options = MaterializeOptions {
                overwrite,
                bound: ExpansionBound::horizon(Utc::now(), horizon_days, max_occurrences),
            };
            run_posts(&events, &config, output, &options)?
        }
    };
    Ok(())
}

async fn load_events(source: &SourceArgs, config: &Config) -> Result<Vec<RawEvent>> {
    let events = match &source.input {
        Some(path) => client::read(path)?,
        None => client::fetch(config).await?,
    };
    Ok(events)
}

fn run_ics(events: &[RawEvent], config: &Config, output: Option<PathBuf>) -> Result<()> {
    let records = calendar::build_records(events, config);
    let ics = calendar::generate(&records, config);
    match output {
        Some(path) => {
            write(&path, ics).with_context(|| format!("could not write {}", path.display()))?;
            info!(path = %path.display(), "wrote calendar");
        }
        None => stdout()
            .lock()
            .write_all(ics.as_bytes())
            .context("could not write calendar to standard output")?,
    }
    Ok(())
}

fn run_posts(
    events: &[RawEvent],
    config: &Config,
    output: PathBuf,
    options: &MaterializeOptions,
) -> Result<()> {
    create_dir_all(&output)
        .with_context(|| format!("could not create {}", output.display()))?;
    post::materialize(&output, events, config, options)?;
    Ok(())
}
