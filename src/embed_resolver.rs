//! Resolves a clip's media URL by rendering its embed page.
//!
//! The embed page only gets its `<video src>` after client-side scripts run,
//! and a single render pass doesn't always get that far. Rendering is retried
//! a bounded number of times with a longer settle time on each attempt.

use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use crate::error::ResolveError;
use crate::models::ClipRecord;
use crate::resolver::ClipSourceResolver;

/// Renders a page with a headless browser and returns the resulting DOM.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, settle: Duration) -> Result<String, String>;
}

/// Delay between attempts. Swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What one render pass found.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    RenderFailed(String),
    ElementMissing,
    SourceMissing,
    Found(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderState {
    Attempt(u32),
    Success(String),
    Failure(Observation),
}

/// Next state after observing the outcome of `attempt` (1-based).
pub fn transition(attempt: u32, max_attempts: u32, observation: Observation) -> RenderState {
    match observation {
        Observation::Found(src) => RenderState::Success(src),
        other if attempt >= max_attempts => RenderState::Failure(other),
        _ => RenderState::Attempt(attempt + 1),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub settle_base: Duration,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            settle_base: Duration::from_secs(1),
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn settle(&self, attempt: u32) -> Duration {
        self.settle_base * attempt
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

fn video_tag() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<video\b([^>]*)>").expect("video tag pattern is valid"))
}

fn src_attribute() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)(?:^|\s)src\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("src attribute pattern is valid")
    })
}

/// Looks for the first `<video>` element and its `src`.
pub fn inspect_dom(html: &str) -> Observation {
    let Some(tag) = video_tag().captures(html) else {
        return Observation::ElementMissing;
    };
    let attributes = &tag[1];
    let src = src_attribute().captures(attributes).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().replace("&amp;", "&"))
    });
    match src {
        Some(src) if !src.is_empty() => Observation::Found(src),
        _ => Observation::SourceMissing,
    }
}

pub struct EmbedPageResolver<R, S = TokioSleeper> {
    http: Client,
    renderer: R,
    sleeper: S,
    policy: RetryPolicy,
}

impl<R: PageRenderer, S: Sleeper> EmbedPageResolver<R, S> {
    pub fn new(http: Client, renderer: R, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            http,
            renderer,
            sleeper,
            policy,
        }
    }

    async fn render_source(&self, embed_url: &str) -> Result<String, ResolveError> {
        let mut attempt = 1;
        loop {
            info!("Rendering {}: try {}", embed_url, attempt);
            let observation = match self
                .renderer
                .render(embed_url, self.policy.settle(attempt))
                .await
            {
                Ok(html) => inspect_dom(&html),
                Err(message) => {
                    warn!("Error rendering {}: {}", embed_url, message);
                    Observation::RenderFailed(message)
                }
            };
            debug!("Attempt {} observed {:?}", attempt, observation);

            match transition(attempt, self.policy.max_attempts, observation) {
                RenderState::Success(src) => return Ok(src),
                RenderState::Attempt(next) => {
                    self.sleeper.sleep(self.policy.backoff(attempt)).await;
                    attempt = next;
                }
                RenderState::Failure(last) => {
                    let url = embed_url.to_string();
                    return Err(match last {
                        Observation::SourceMissing => ResolveError::SourceMissing { url, attempts: attempt },
                        Observation::RenderFailed(message) => ResolveError::RenderFailed {
                            url,
                            attempts: attempt,
                            message,
                        },
                        _ => ResolveError::ElementMissing { url, attempts: attempt },
                    });
                }
            }
        }
    }
}

#[async_trait]
impl<R: PageRenderer, S: Sleeper> ClipSourceResolver for EmbedPageResolver<R, S> {
    async fn resolve(&self, clip: &ClipRecord) -> Result<Url, ResolveError> {
        let embed_url = clip.embed_url.as_str();
        info!("Getting clip source URL from {}", embed_url);

        let resp = self.http.get(embed_url).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(ResolveError::Upstream {
                url: embed_url.to_string(),
                status,
            });
        }

        let src = self.render_source(embed_url).await?;
        info!("Found video src {}", src);
        let base = Url::parse(embed_url).map_err(|e| ResolveError::InvalidUrl {
            url: embed_url.to_string(),
            message: e.to_string(),
        })?;
        base.join(&src).map_err(|e| ResolveError::InvalidUrl {
            url: src,
            message: e.to_string(),
        })
    }
}

const BROWSER_BINARIES: [&str; 4] = ["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"];

/// Renders pages with a headless Chromium and dumps the DOM.
pub struct ChromiumRenderer {
    binary: PathBuf,
}

impl ChromiumRenderer {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Finds a Chromium-family browser on `PATH`.
    pub fn locate() -> Option<Self> {
        BROWSER_BINARIES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, settle: Duration) -> Result<String, String> {
        let budget = format!("--virtual-time-budget={}", settle.as_millis());
        let output = Command::new(&self.binary)
            .args([
                "--headless",
                "--disable-gpu",
                "--mute-audio",
                "--autoplay-policy=no-user-gesture-required",
                budget.as_str(),
                "--dump-dom",
                url,
            ])
            .output()
            .await
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
