use anyhow::{Context, Result};
use log::info;
use std::collections::HashSet;
use std::path::Path;

use crate::clip_collector::ClipCollector;
use crate::models::{ChannelRef, TimeWindow};
use crate::splicer::{SpliceReport, VideoSplicer};

/// Selects good clips for a roster and splices them into one video.
pub struct Pipeline {
    collector: ClipCollector,
    splicer: VideoSplicer,
}

impl Pipeline {
    pub fn new(collector: ClipCollector, splicer: VideoSplicer) -> Self {
        Self {
            collector,
            splicer,
        }
    }

    /// Collection errors abort the run before anything is downloaded.
    pub async fn run(
        &self,
        roster: &[ChannelRef],
        window: &TimeWindow,
        languages: Option<&HashSet<String>>,
        output: &Path,
        clips_dir: &Path,
    ) -> Result<SpliceReport> {
        let clips = self
            .collector
            .collect(roster, window, languages)
            .await
            .context("Failed to collect clips")?;

        let report = self
            .splicer
            .splice(&clips, output, clips_dir)
            .await
            .with_context(|| format!("Failed to splice clips into {}", output.display()))?;

        match &report.output {
            Some(path) => info!(
                "Spliced {} clip(s) into {} ({} failed)",
                report.downloaded.len(),
                path.display(),
                report.failed.len()
            ),
            None => info!("No clips were spliced, {} not written", output.display()),
        }
        Ok(report)
    }
}
