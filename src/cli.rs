use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::warn;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::models::TimeWindow;
use crate::splicer::OutputContainer;

/// Gets 'good' clips from the members of a Twitch team and splices them into a video.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// File name of the output file. The extension picks the container;
    /// avi is written with PNG frames.
    #[arg(value_parser = parse_output_file)]
    pub output_file: PathBuf,

    /// Name of the Twitch team to get clips from.
    pub team: String,

    /// Start of the time window, RFC 3339 (e.g. 2019-08-19T00:00:00Z).
    /// Default is the beginning of time.
    #[arg(short = 's', long, alias = "started_at", value_parser = parse_rfc3339)]
    pub started_at: Option<DateTime<Utc>>,

    /// End of the time window, RFC 3339. Defaults to one week after the
    /// start; ignored when no start is given.
    #[arg(short = 'e', long, alias = "ended_at", value_parser = parse_rfc3339)]
    pub ended_at: Option<DateTime<Utc>>,

    /// Directory to download the clips into. Must already exist.
    #[arg(short = 'c', long, alias = "clips_dir", default_value = "./")]
    pub clips_dir: PathBuf,

    /// Only use channels broadcasting in this language. Repeatable.
    #[arg(short = 'L', long = "lang")]
    pub languages: Vec<String>,

    /// Write logs to this file instead of stderr.
    #[arg(short = 'l', long, alias = "log_file")]
    pub log_file: Option<PathBuf>,

    /// Settings file. Defaults to <config dir>/clipreel/config.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Upload the finished reel to this S3 bucket.
    #[arg(long)]
    pub upload_bucket: Option<String>,

    /// S3-compatible endpoint for the upload, e.g. http://127.0.0.1:9000.
    #[arg(long, requires = "upload_bucket")]
    pub s3_endpoint: Option<String>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("{raw:?} is not an RFC 3339 time: {e}"))
}

fn parse_output_file(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    OutputContainer::from_path(&path).map_err(|e| e.to_string())?;
    Ok(path)
}

impl Cli {
    pub fn time_window(&self) -> Result<TimeWindow> {
        match (self.started_at, self.ended_at) {
            (None, None) => Ok(TimeWindow::unbounded()),
            (None, Some(_)) => {
                warn!("--ended-at is ignored without --started-at");
                Ok(TimeWindow::unbounded())
            }
            (Some(start), None) => Ok(TimeWindow::week_from(start)),
            (Some(start), Some(end)) => {
                if end < start {
                    bail!("--ended-at {} is before --started-at {}", end, start);
                }
                Ok(TimeWindow {
                    started_at: Some(start),
                    ended_at: Some(end),
                })
            }
        }
    }

    /// `None` means every language.
    pub fn language_filter(&self) -> Option<HashSet<String>> {
        if self.languages.is_empty() {
            None
        } else {
            Some(self.languages.iter().cloned().collect())
        }
    }
}
