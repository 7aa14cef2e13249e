use crate::config::RatingConfig;

/// Scores clips against their channel's usual viewership.
///
/// `rating = views / (baseline / divisor + floor)`. The floor keeps the
/// denominator positive when the baseline is 0 and sets a fixed bar for
/// small channels; bigger channels need proportionally more views.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipScorer {
    config: RatingConfig,
}

impl ClipScorer {
    pub fn new(config: RatingConfig) -> Self {
        Self { config }
    }

    pub fn rating(&self, clip_views: f64, baseline: f64) -> f64 {
        clip_views / (baseline / self.config.baseline_divisor + self.config.denominator_floor)
    }

    /// Inclusive at the threshold.
    pub fn is_good(&self, rating: f64) -> bool {
        rating >= self.config.threshold
    }
}
