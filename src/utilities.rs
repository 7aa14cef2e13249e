use log::{debug, error};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;

use crate::error::SpliceError;

/// Keep this much of ffmpeg's stderr in errors.
const STDERR_TAIL: usize = 2000;

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Runs ffmpeg with `args`, failing on a non-zero exit.
pub async fn run_ffmpeg(args: &[OsString]) -> Result<(), SpliceError> {
    let ffmpeg = which::which("ffmpeg").map_err(|_| SpliceError::FfmpegNotFound)?;
    debug!("Running {} {:?}", ffmpeg.display(), args);

    let output = tokio::process::Command::new(ffmpeg)
        .args(args)
        .output()
        .await?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!("ffmpeg stdout: {}", String::from_utf8_lossy(&output.stdout));

    if !output.status.success() {
        error!("ffmpeg stderr: {}", tail(&stderr, STDERR_TAIL));
        return Err(SpliceError::FfmpegFailed {
            message: format!("ffmpeg exited with {}", output.status),
            stderr: tail(&stderr, STDERR_TAIL).to_string(),
        });
    }
    debug!("ffmpeg stderr: {}", stderr);
    Ok(())
}

/// Streams and length of a media file, as reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub has_audio: bool,
    /// Seconds; absent when the container doesn't record it.
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Reads `ffprobe -of json` output.
pub fn parse_probe(json: &[u8]) -> Result<MediaProbe, String> {
    let probe: ProbeOutput = serde_json::from_slice(json).map_err(|e| e.to_string())?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration = match probe.format.and_then(|f| f.duration) {
        Some(raw) => Some(
            raw.parse::<f64>()
                .map_err(|e| format!("bad duration {raw:?}: {e}"))?,
        ),
        None => None,
    };
    Ok(MediaProbe {
        has_audio,
        duration,
    })
}

pub async fn probe_media(path: &Path) -> Result<MediaProbe, SpliceError> {
    let ffprobe = which::which("ffprobe").map_err(|_| SpliceError::FfprobeNotFound)?;
    let output = tokio::process::Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "stream=codec_type:format=duration", "-of", "json"])
        .arg(path)
        .output()
        .await?;

    let failed = |message: String| SpliceError::ProbeFailed {
        path: path.display().to_string(),
        message,
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(tail(&stderr, STDERR_TAIL).to_string()));
    }
    let probe = parse_probe(&output.stdout).map_err(failed)?;
    debug!("Probed {}: {:?}", path.display(), probe);
    Ok(probe)
}
