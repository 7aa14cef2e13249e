use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::config::{ResolverStrategy, Settings};
use crate::embed_resolver::{ChromiumRenderer, EmbedPageResolver, RetryPolicy, TokioSleeper};
use crate::error::ResolveError;
use crate::gql_resolver::GqlResolver;
use crate::models::ClipRecord;
use crate::thumbnail_resolver::ThumbnailResolver;

/// Finds a directly downloadable media URL for a clip.
///
/// Upstream URLs expire, so every call does fresh work and nothing is cached.
#[async_trait]
pub trait ClipSourceResolver: Send + Sync {
    async fn resolve(&self, clip: &ClipRecord) -> Result<Url, ResolveError>;
}

/// Builds the resolver for the configured strategy.
pub fn from_settings(http: Client, settings: &Settings) -> Result<Box<dyn ClipSourceResolver>> {
    let resolver = &settings.resolver;
    info!("Using {:?} clip source resolution", resolver.strategy);
    Ok(match resolver.strategy {
        ResolverStrategy::Thumbnail => Box::new(ThumbnailResolver::new(&settings.endpoints.media)),
        ResolverStrategy::Embed => {
            let renderer = ChromiumRenderer::locate()
                .ok_or_else(|| anyhow!("Embed resolution needs chromium or google-chrome in PATH"))?;
            let policy = RetryPolicy {
                max_attempts: resolver.max_render_attempts.max(1),
                settle_base: Duration::from_millis(resolver.settle_base_ms),
                backoff_base: Duration::from_millis(resolver.retry_backoff_ms),
            };
            Box::new(EmbedPageResolver::new(http, renderer, TokioSleeper, policy))
        }
        ResolverStrategy::Gql => Box::new(GqlResolver::new(
            http,
            &settings.endpoints.gql,
            &resolver.gql_client_id,
            resolver.preferred_quality.clone(),
        )),
    })
}
