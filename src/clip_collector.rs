use log::{debug, info};
use std::collections::HashSet;

use crate::error::ApiError;
use crate::helix::{HelixClient, Page};
use crate::models::{ChannelRef, ClipRecord, TimeWindow};
use crate::rating::ClipScorer;
use crate::viewership::PopularityBaseline;

/// Largest page size the clip listing accepts.
const CLIPS_PAGE_SIZE: u32 = 100;

/// Collects the "good" clips of every channel in a roster.
pub struct ClipCollector {
    helix: HelixClient,
    baseline: Box<dyn PopularityBaseline>,
    scorer: ClipScorer,
}

impl ClipCollector {
    pub fn new(helix: HelixClient, baseline: Box<dyn PopularityBaseline>, scorer: ClipScorer) -> Self {
        Self {
            helix,
            baseline,
            scorer,
        }
    }

    /// Good clips of all channels, in roster order and then listing order.
    ///
    /// Any upstream error aborts the whole collection.
    pub async fn collect(
        &self,
        roster: &[ChannelRef],
        window: &TimeWindow,
        languages: Option<&HashSet<String>>,
    ) -> Result<Vec<ClipRecord>, ApiError> {
        info!("Getting clips for {} channel(s)", roster.len());
        let mut total = Vec::new();
        for channel in roster {
            if let Some(languages) = languages {
                if !languages.contains(&channel.language) {
                    debug!(
                        "Skipping {}: language {:?} not requested",
                        channel.login, channel.language
                    );
                    continue;
                }
            }
            total.extend(self.good_clips(channel, window).await?);
        }
        info!("Got {} good clip(s)", total.len());
        Ok(total)
    }

    async fn good_clips(
        &self,
        channel: &ChannelRef,
        window: &TimeWindow,
    ) -> Result<Vec<ClipRecord>, ApiError> {
        let baseline = self.baseline.average_recent_view_metric(channel).await?;
        if baseline == 0.0 {
            info!(
                "{} has no recent viewership, skipping getting clips",
                channel.login
            );
            return Ok(Vec::new());
        }

        let clips = self.list_clips(channel, window).await?;
        let mut good = Vec::new();
        for mut clip in clips {
            let rating = self.scorer.rating(clip.view_count as f64, baseline);
            debug!("Clip {} has {} views, rating {:.3}", clip.id, clip.view_count, rating);
            clip.rating = Some(rating);
            if self.scorer.is_good(rating) {
                info!("Clip {} is good (rating {:.3})", clip.id, rating);
                good.push(clip);
            }
        }
        info!("Found {} good clip(s) for {}", good.len(), channel.login);
        Ok(good)
    }

    /// Every clip of the channel in the window, following cursors to the end.
    async fn list_clips(
        &self,
        channel: &ChannelRef,
        window: &TimeWindow,
    ) -> Result<Vec<ClipRecord>, ApiError> {
        info!("Getting clips for {}", channel.login);
        let mut clips = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("broadcaster_id", channel.id.clone()),
                ("first", CLIPS_PAGE_SIZE.to_string()),
            ];
            query.extend(window.query_params());
            if let Some(after) = &cursor {
                query.push(("after", after.clone()));
            }

            let page: Page<ClipRecord> = self.helix.get_json("clips", &query).await?;
            let fetched = page.data.len();
            clips.extend(page.data);

            cursor = match page.pagination.cursor {
                Some(next) if fetched > 0 && !next.is_empty() && seen_cursors.insert(next.clone()) => {
                    Some(next)
                }
                _ => break,
            };
        }

        debug!("Listed {} clip(s) for {}", clips.len(), channel.login);
        Ok(clips)
    }
}
