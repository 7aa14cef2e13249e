mod auth;
mod cli;
mod clip_collector;
mod config;
mod downloader;
mod embed_resolver;
mod error;
mod gql_resolver;
mod helix;
mod models;
mod pipeline;
mod rating;
mod resolver;
mod roster;
mod s3_uploader;
mod splicer;
mod thumbnail_resolver;
mod utilities;
mod viewership;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::{info, warn};
use reqwest::Client;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;

use crate::auth::AppAccessToken;
use crate::cli::Cli;
use crate::clip_collector::ClipCollector;
use crate::config::{default_config_path, BaselineSource, Settings};
use crate::downloader::ClipDownloader;
use crate::helix::HelixClient;
use crate::models::{Credentials, TimeWindow};
use crate::pipeline::Pipeline;
use crate::rating::ClipScorer;
use crate::roster::TeamRoster;
use crate::s3_uploader::S3Uploader;
use crate::splicer::{FfmpegConcatenator, SpliceReport, VideoSplicer};
use crate::viewership::{PopularityBaseline, RecentVideoViews, RecentViewership};

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        writeln!(buf, "[{}]{}: {}", buf.timestamp(), record.level(), record.args())
    });
    if let Some(path) = &cli.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path().context("Couldn't determine the user config directory")?,
    };
    let mut settings = Settings::load(&path)?;
    settings.apply_env_overrides();
    Ok(settings)
}

/// Everything between acquiring the token and revoking it.
async fn make_reel(
    cli: &Cli,
    settings: &Settings,
    http: Client,
    credentials: Credentials,
    window: &TimeWindow,
    languages: Option<&HashSet<String>>,
) -> Result<SpliceReport> {
    let helix = HelixClient::new(http.clone(), &settings.endpoints.helix, credentials);
    let roster = TeamRoster::new(&helix)
        .fetch(&cli.team)
        .await
        .with_context(|| format!("Failed to get the roster of team {}", cli.team))?;
    info!("Team {} has {} member(s)", cli.team, roster.len());

    let baseline: Box<dyn PopularityBaseline> = match settings.baseline.source {
        BaselineSource::Twitchmetrics => Box::new(RecentViewership::new(
            http.clone(),
            &settings.endpoints.twitchmetrics,
        )),
        BaselineSource::Videos => Box::new(RecentVideoViews::new(
            helix.clone(),
            settings.baseline.recent_videos,
        )),
    };
    let collector = ClipCollector::new(helix, baseline, ClipScorer::new(settings.rating));

    let resolver = resolver::from_settings(http.clone(), settings)?;
    let splicer = VideoSplicer::new(
        ClipDownloader::new(http, resolver),
        Box::new(FfmpegConcatenator),
    );

    Pipeline::new(collector, splicer)
        .run(&roster, window, languages, &cli.output_file, &cli.clips_dir)
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let window = cli.time_window()?;
    let languages = cli.language_filter();
    let settings = load_settings(&cli)?;
    let (client_id, client_secret) = settings.client_credentials()?;

    let http = Client::new();
    let token = AppAccessToken::request(
        http.clone(),
        &settings.endpoints.oauth2,
        &client_id,
        &client_secret,
    )
    .await
    .context("Failed to get an app access token")?;

    let outcome = match token.validate().await {
        Ok(true) => {
            make_reel(
                &cli,
                &settings,
                http,
                token.credentials(),
                &window,
                languages.as_ref(),
            )
            .await
        }
        Ok(false) => Err(anyhow!("App access token didn't validate")),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to validate app access token")),
    };

    if let Err(e) = token.revoke().await {
        warn!("Couldn't revoke app access token: {}", e);
    }
    let report = outcome?;

    match (&cli.upload_bucket, &report.output) {
        (Some(bucket), Some(output)) => {
            let uploader = S3Uploader::new(bucket, cli.s3_endpoint.as_deref()).await?;
            let url = uploader.upload_reel(output).await?;
            info!("Reel is available at {}", url);
        }
        (Some(bucket), None) => info!("Nothing was spliced, skipping upload to {}", bucket),
        _ => {}
    }
    Ok(())
}
