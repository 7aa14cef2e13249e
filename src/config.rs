use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CLIENT_ID_ENV: &str = "TWITCH_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "TWITCH_CLIENT_SECRET";

/// Settings loaded from `config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub credentials: CredentialSettings,
    pub endpoints: Endpoints,
    pub rating: RatingConfig,
    pub baseline: BaselineSettings,
    pub resolver: ResolverSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub helix: String,
    pub oauth2: String,
    pub twitchmetrics: String,
    pub gql: String,
    /// Host serving clip mp4 files for the thumbnail strategy.
    pub media: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            helix: "https://api.twitch.tv/helix".to_string(),
            oauth2: "https://id.twitch.tv/oauth2".to_string(),
            twitchmetrics: "https://www.twitchmetrics.net".to_string(),
            gql: "https://gql.twitch.tv/gql".to_string(),
            media: "https://clips-media-assets2.twitch.tv".to_string(),
        }
    }
}

/// Tuning constants of the clip rating. Empirical; change only deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub baseline_divisor: f64,
    pub denominator_floor: f64,
    pub threshold: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            baseline_divisor: 9.0,
            denominator_floor: 100.0,
            threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineSource {
    #[default]
    Twitchmetrics,
    Videos,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaselineSettings {
    pub source: BaselineSource,
    /// Number of archived videos averaged by the `videos` source.
    pub recent_videos: u32,
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            source: BaselineSource::default(),
            recent_videos: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverStrategy {
    #[default]
    Thumbnail,
    Embed,
    Gql,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub strategy: ResolverStrategy,
    pub max_render_attempts: u32,
    pub settle_base_ms: u64,
    pub retry_backoff_ms: u64,
    pub gql_client_id: String,
    pub preferred_quality: Option<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            strategy: ResolverStrategy::default(),
            max_render_attempts: 3,
            settle_base_ms: 1000,
            retry_backoff_ms: 500,
            gql_client_id: "kimne78kx3ncx6brgo4mv6wki5h1ko".to_string(),
            preferred_quality: None,
        }
    }
}

/// Default settings path, `<config dir>/clipreel/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clipreel").join("config.toml"))
}

impl Settings {
    /// Loads settings from `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var(CLIENT_ID_ENV) {
            self.credentials.twitch_client_id = Some(id);
        }
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            self.credentials.twitch_client_secret = Some(secret);
        }
    }

    /// Returns `(client_id, client_secret)` or names the missing key.
    pub fn client_credentials(&self) -> Result<(String, String)> {
        let id = match self.credentials.twitch_client_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => bail!("Config does not contain {}", CLIENT_ID_ENV),
        };
        let secret = match self.credentials.twitch_client_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => bail!("Config does not contain {}", CLIENT_SECRET_ENV),
        };
        Ok((id, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.rating, RatingConfig::default());
        assert_eq!(settings.resolver.strategy, ResolverStrategy::Thumbnail);
        assert_eq!(settings.resolver.max_render_attempts, 3);
        assert_eq!(settings.baseline.source, BaselineSource::Twitchmetrics);
        assert_eq!(settings.endpoints.helix, "https://api.twitch.tv/helix");
    }

    #[test]
    fn parses_partial_sections() {
        let settings = Settings::parse(
            r#"
            [credentials]
            twitch_client_id = "uo6dggojyb8d6soh92zknwmi5ej1q2"
            twitch_client_secret = "nyo51xcdrerl8z9m56w9w6wg"

            [resolver]
            strategy = "embed"

            [baseline]
            source = "videos"
            recent_videos = 5
            "#,
        )
        .unwrap();

        let (id, secret) = settings.client_credentials().unwrap();
        assert_eq!(id, "uo6dggojyb8d6soh92zknwmi5ej1q2");
        assert_eq!(secret, "nyo51xcdrerl8z9m56w9w6wg");
        assert_eq!(settings.resolver.strategy, ResolverStrategy::Embed);
        assert_eq!(settings.resolver.settle_base_ms, 1000);
        assert_eq!(settings.baseline.source, BaselineSource::Videos);
        assert_eq!(settings.baseline.recent_videos, 5);
    }

    #[test]
    fn missing_secret_is_named() {
        let settings = Settings::parse(
            r#"
            [credentials]
            twitch_client_id = "abc"
            "#,
        )
        .unwrap();
        let err = settings.client_credentials().unwrap_err();
        assert!(err.to_string().contains(CLIENT_SECRET_ENV));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.rating.threshold, 1.0);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(Settings::parse("[resolver]\nstrategy = \"telepathy\"").is_err());
    }
}
