use std::path::PathBuf;
use thiserror::Error;

/// Errors from the platform APIs used while building the clip list.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}: {message}")]
    Upstream {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    #[error("Team {0} not found")]
    TeamNotFound(String),
}

impl ApiError {
    pub fn malformed(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }
}

/// Errors locating the playable media URL of a single clip.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Clip reference {0} does not match the expected thumbnail pattern")]
    MalformedReference(String),

    #[error("Couldn't find video element after rendering {url} ({attempts} attempts)")]
    ElementMissing { url: String, attempts: u32 },

    #[error("Couldn't find src attribute in video element after rendering {url} ({attempts} attempts)")]
    SourceMissing { url: String, attempts: u32 },

    #[error("Rendering {url} failed after {attempts} attempts: {message}")]
    RenderFailed {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Clip {0} not found upstream")]
    ClipNotFound(String),

    #[error("Query for clip {clip_id} failed: {message}")]
    Query { clip_id: String, message: String },

    #[error("{url} returned status {status}")]
    Upstream { url: String, status: u16 },

    #[error("Invalid media URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors downloading one clip to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Couldn't resolve media URL: {0}")]
    Resolution(#[from] ResolveError),

    #[error("{url} returned status {status}")]
    Upstream { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Destination {0} is not an existing directory")]
    InvalidDestination(PathBuf),

    #[error("Clip id {0:?} can't be used as a file name")]
    InvalidClipId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Filesystem problems affect every clip, so the batch stops on them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidDestination(_) | Self::Io(_))
    }
}

/// Errors assembling the final reel.
#[derive(Debug, Error)]
pub enum SpliceError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}\n{stderr}")]
    FfmpegFailed { message: String, stderr: String },

    #[error("Couldn't probe {path}: {message}")]
    ProbeFailed { path: String, message: String },

    #[error("Output file {0} has no extension to pick a container from")]
    UnsupportedContainer(String),

    #[error("Download stage aborted: {0}")]
    Download(#[from] DownloadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_errors_are_fatal() {
        assert!(DownloadError::InvalidDestination(PathBuf::from("/nope")).is_fatal());
        assert!(DownloadError::Io(std::io::Error::other("disk full")).is_fatal());
    }

    #[test]
    fn per_clip_errors_are_not_fatal() {
        let resolution = DownloadError::Resolution(ResolveError::ClipNotFound("abc".into()));
        assert!(!resolution.is_fatal());

        let upstream = DownloadError::Upstream {
            url: "https://media.example/abc.mp4".into(),
            status: 403,
        };
        assert!(!upstream.is_fatal());
        assert!(!DownloadError::InvalidClipId("../x".into()).is_fatal());
    }

    #[test]
    fn ffmpeg_failure_shows_stderr() {
        let err = SpliceError::FfmpegFailed {
            message: "ffmpeg exited with exit status: 1".into(),
            stderr: "Stream specifier ':a' matches no streams.".into(),
        };
        assert_eq!(
            err.to_string(),
            "FFmpeg command failed: ffmpeg exited with exit status: 1\nStream specifier ':a' matches no streams."
        );

        let chain = format!("{:#}", anyhow::Error::new(err).context("Failed to splice"));
        assert!(chain.contains("matches no streams"));
    }
}
