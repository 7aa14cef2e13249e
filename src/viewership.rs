//! Popularity baselines: how many viewers a channel normally has.
//!
//! A baseline of `0.0` means "no recent activity" and is a normal result,
//! not an error. The collector skips such channels.

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::helix::{check_status, HelixClient, Page};
use crate::models::ChannelRef;

#[async_trait]
pub trait PopularityBaseline: Send + Sync {
    async fn average_recent_view_metric(&self, channel: &ChannelRef) -> Result<f64, ApiError>;
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Average viewers over the past week, from twitchmetrics.
pub struct RecentViewership {
    http: Client,
    base_url: String,
}

impl RecentViewership {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PopularityBaseline for RecentViewership {
    async fn average_recent_view_metric(&self, channel: &ChannelRef) -> Result<f64, ApiError> {
        info!("Getting average view count for {}", channel.login);
        let endpoint = "recent_viewership_values";
        let url = format!(
            "{}/c/{}-{}/recent_viewership_values",
            self.base_url, channel.id, channel.login
        );
        let resp = self.http.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            info!("Couldn't find weekly viewer stats for {}", channel.login);
            return Ok(0.0);
        }
        let resp = check_status(endpoint, resp).await?;

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(0.0);
        }
        // Each sample is `[timestamp, viewers, game]`.
        let samples: Vec<Vec<Value>> =
            serde_json::from_str(&body).map_err(|e| ApiError::malformed(endpoint, e))?;
        let views = samples
            .iter()
            .map(|sample| {
                sample
                    .get(1)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| ApiError::malformed(endpoint, format!("bad sample {sample:?}")))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        debug!(
            "view_snap_count = {}, total_views = {}",
            views.len(),
            views.iter().sum::<f64>()
        );
        let avg = mean(&views);
        info!("Average views in the past week for {} is {}", channel.login, avg);
        Ok(avg)
    }
}

#[derive(Debug, Deserialize)]
struct Video {
    view_count: u64,
}

/// Average view count of the channel's latest archived broadcasts.
pub struct RecentVideoViews {
    helix: HelixClient,
    count: u32,
}

impl RecentVideoViews {
    pub fn new(helix: HelixClient, count: u32) -> Self {
        Self { helix, count }
    }
}

#[async_trait]
impl PopularityBaseline for RecentVideoViews {
    async fn average_recent_view_metric(&self, channel: &ChannelRef) -> Result<f64, ApiError> {
        info!("Getting average video views for {}", channel.login);
        let query = [
            ("user_id", channel.id.clone()),
            ("type", "archive".to_string()),
            ("first", self.count.clamp(1, 100).to_string()),
        ];
        let page: Page<Video> = match self.helix.get_json("videos", &query).await {
            Err(ApiError::Upstream { status: 404, .. }) => {
                info!("No videos found for {}", channel.login);
                return Ok(0.0);
            }
            other => other?,
        };

        let views: Vec<f64> = page.data.iter().map(|v| v.view_count as f64).collect();
        let avg = mean(&views);
        info!("Average video views for {} is {}", channel.login, avg);
        Ok(avg)
    }
}
