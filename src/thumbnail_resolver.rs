use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::error::ResolveError;
use crate::models::ClipRecord;
use crate::resolver::ClipSourceResolver;

/// `https://clips-media-assets[2].twitch.tv/<numeric id>-preview-<w>x<h>.jpg`
fn thumbnail_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://clips-media-assets2?\.twitch\.tv/(?:AT-cm%7C)?(\d{4,})-preview-\d+x\d+\.jpg$")
            .expect("thumbnail pattern is valid")
    })
}

/// Builds the mp4 URL from the numeric id embedded in the thumbnail URL.
///
/// A pure parse: no network access and nothing to retry.
pub struct ThumbnailResolver {
    media_base: String,
}

impl ThumbnailResolver {
    pub fn new(media_base: &str) -> Self {
        Self {
            media_base: media_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn media_url(&self, thumbnail_url: &str) -> Result<Url, ResolveError> {
        let caps = thumbnail_pattern()
            .captures(thumbnail_url)
            .ok_or_else(|| ResolveError::MalformedReference(thumbnail_url.to_string()))?;
        let numeric_id = &caps[1];
        debug!("Thumbnail {} has id {}", thumbnail_url, numeric_id);

        let raw = format!("{}/AT-{}-640x360.mp4", self.media_base, numeric_id);
        Url::parse(&raw).map_err(|e| ResolveError::InvalidUrl {
            url: raw,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ClipSourceResolver for ThumbnailResolver {
    async fn resolve(&self, clip: &ClipRecord) -> Result<Url, ResolveError> {
        let url = self.media_url(&clip.thumbnail_url)?;
        info!("Clip {} source is {}", clip.id, url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ThumbnailResolver {
        ThumbnailResolver::new("https://clips-media-assets2.twitch.tv")
    }

    #[test]
    fn builds_media_url() {
        let url = resolver()
            .media_url("https://clips-media-assets.twitch.tv/157589949-preview-480x272.jpg")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://clips-media-assets2.twitch.tv/AT-157589949-640x360.mp4"
        );
    }

    #[test]
    fn accepts_prefixed_thumbnail() {
        let url = resolver()
            .media_url("https://clips-media-assets2.twitch.tv/AT-cm%7C470427513-preview-480x272.jpg")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://clips-media-assets2.twitch.tv/AT-470427513-640x360.mp4"
        );
    }

    #[test]
    fn rejects_other_hosts_and_shapes() {
        for bad in [
            "https://evil.example/157589949-preview-480x272.jpg",
            "https://clips-media-assets.twitch.tv/123-preview-480x272.jpg",
            "https://clips-media-assets.twitch.tv/vod-157589949-offset-10-preview-480x272.jpg",
            "https://clips-media-assets.twitch.tv/157589949-preview-480x272.png",
            "",
        ] {
            assert!(
                matches!(resolver().media_url(bad), Err(ResolveError::MalformedReference(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn resolves_clip_record() {
        let clip: ClipRecord = serde_json::from_value(serde_json::json!({
            "id": "RandomClip1",
            "broadcaster_id": "5582097",
            "view_count": 250,
            "created_at": "2017-11-30T22:34:18Z",
            "thumbnail_url": "https://clips-media-assets.twitch.tv/157589949-preview-480x272.jpg"
        }))
        .unwrap();
        let url = resolver().resolve(&clip).await.unwrap();
        assert!(url.as_str().ends_with("/AT-157589949-640x360.mp4"));
    }
}
