use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Client id and bearer token attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub token: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            token: token.into(),
        }
    }
}

/// A member of the team whose clips are considered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    /// Login name, used in URLs.
    pub login: String,
    pub display_name: String,
    /// Broadcaster language tag, e.g. "en".
    pub language: String,
}

/// One clip as returned by the clip listing, plus its computed rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub embed_url: String,
    pub broadcaster_id: String,
    #[serde(default)]
    pub broadcaster_name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub title: String,
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(skip_deserializing)]
    pub rating: Option<f64>,
}

/// Creation-time bounds for the clip listing. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Window starting at `started_at` and lasting one week.
    pub fn week_from(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(started_at),
            ended_at: Some(started_at + Duration::weeks(1)),
        }
    }

    /// Query parameters for the clip listing.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(start) = self.started_at {
            params.push(("started_at", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(end) = self.ended_at {
            params.push(("ended_at", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        params
    }
}

/// A clip materialised on disk as `<dir>/<clip id>.mp4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalClipFile {
    pub clip_id: String,
    pub path: PathBuf,
}
