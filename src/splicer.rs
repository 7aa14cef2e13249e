use async_trait::async_trait;
use log::{info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::downloader::{ensure_destination, ClipDownloader};
use crate::error::SpliceError;
use crate::models::{ClipRecord, LocalClipFile};
use crate::utilities::{probe_media, run_ffmpeg};

/// Frame size every clip is scaled and padded to before joining.
const TARGET_WIDTH: u32 = 1920;
const TARGET_HEIGHT: u32 = 1080;
/// Audio format every track is converted to before joining.
const AUDIO_RATE: u32 = 48_000;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputContainer {
    Mp4,
    Ogv,
    Webm,
    Avi,
    /// Any other extension; ffmpeg picks the muxer from it.
    Other,
}

/// How video frames are encoded in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderPath {
    /// ffmpeg's default video encoder for the container.
    ContainerDefault,
    /// PNG frames; AVI output takes this path instead of the default.
    Png,
}

impl OutputContainer {
    pub fn from_path(path: &Path) -> Result<Self, SpliceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "" => Err(SpliceError::UnsupportedContainer(path.display().to_string())),
            "mp4" => Ok(Self::Mp4),
            "ogv" => Ok(Self::Ogv),
            "webm" => Ok(Self::Webm),
            "avi" => Ok(Self::Avi),
            _ => Ok(Self::Other),
        }
    }

    pub fn encoder(self) -> EncoderPath {
        match self {
            Self::Avi => EncoderPath::Png,
            Self::Mp4 | Self::Ogv | Self::Webm | Self::Other => EncoderPath::ContainerDefault,
        }
    }
}

/// Joins local video files, in order, into one output file.
#[async_trait]
pub trait Concatenator: Send + Sync {
    async fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        encoder: EncoderPath,
    ) -> Result<(), SpliceError>;
}

/// A downloaded clip as the concat graph sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpliceInput {
    pub path: PathBuf,
    /// Seconds of generated silence standing in for a missing audio track.
    pub silence: Option<f64>,
}

impl SpliceInput {
    pub fn with_audio(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            silence: None,
        }
    }

    pub fn silent(path: impl Into<PathBuf>, seconds: f64) -> Self {
        Self {
            path: path.into(),
            silence: Some(seconds),
        }
    }
}

/// ffmpeg arguments joining `inputs` with the concat filter.
///
/// Clips without audio get an `anullsrc` input of their own length, so
/// every segment has both streams.
pub fn concat_args(inputs: &[SpliceInput], output: &Path, encoder: EncoderPath) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into()];
    for input in inputs {
        args.push("-i".into());
        args.push(input.path.as_os_str().into());
    }

    let mut audio_sources = Vec::with_capacity(inputs.len());
    let mut next_input = inputs.len();
    for (i, input) in inputs.iter().enumerate() {
        match input.silence {
            Some(seconds) => {
                args.extend(
                    [
                        "-f".to_string(),
                        "lavfi".to_string(),
                        "-t".to_string(),
                        format!("{seconds:.3}"),
                        "-i".to_string(),
                        format!("anullsrc=channel_layout=stereo:sample_rate={AUDIO_RATE}"),
                    ]
                    .into_iter()
                    .map(OsString::from),
                );
                audio_sources.push(format!("{next_input}:a"));
                next_input += 1;
            }
            None => audio_sources.push(format!("{i}:a")),
        }
    }

    let mut graph = String::new();
    for i in 0..inputs.len() {
        graph.push_str(&format!(
            "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{i}];",
            w = TARGET_WIDTH,
            h = TARGET_HEIGHT,
        ));
    }
    for (i, source) in audio_sources.iter().enumerate() {
        graph.push_str(&format!(
            "[{source}]aresample={AUDIO_RATE},aformat=sample_fmts=fltp:channel_layouts=stereo[a{i}];"
        ));
    }
    for i in 0..inputs.len() {
        graph.push_str(&format!("[v{i}][a{i}]"));
    }
    graph.push_str(&format!("concat=n={}:v=1:a=1[outv][outa]", inputs.len()));

    args.extend(
        ["-filter_complex", graph.as_str(), "-map", "[outv]", "-map", "[outa]"]
            .into_iter()
            .map(OsString::from),
    );
    if encoder == EncoderPath::Png {
        args.push("-c:v".into());
        args.push("png".into());
    }
    args.push(output.into());
    args
}

pub struct FfmpegConcatenator;

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        encoder: EncoderPath,
    ) -> Result<(), SpliceError> {
        let mut probed = Vec::with_capacity(inputs.len());
        for path in inputs {
            let probe = probe_media(path).await?;
            if probe.has_audio {
                probed.push(SpliceInput::with_audio(path));
                continue;
            }
            let seconds = probe.duration.ok_or_else(|| SpliceError::ProbeFailed {
                path: path.display().to_string(),
                message: "no audio track and no duration to pad silence to".to_string(),
            })?;
            info!("{} has no audio, padding {:.1}s of silence", path.display(), seconds);
            probed.push(SpliceInput::silent(path, seconds));
        }
        run_ffmpeg(&concat_args(&probed, output, encoder)).await
    }
}

/// Outcome of a splice. `output` is `None` when nothing was written.
#[derive(Debug, Default)]
pub struct SpliceReport {
    pub output: Option<PathBuf>,
    pub downloaded: Vec<LocalClipFile>,
    pub failed: Vec<String>,
}

/// Downloads clips and joins the ones that made it into a single video.
pub struct VideoSplicer {
    downloader: ClipDownloader,
    concatenator: Box<dyn Concatenator>,
}

impl VideoSplicer {
    pub fn new(downloader: ClipDownloader, concatenator: Box<dyn Concatenator>) -> Self {
        Self {
            downloader,
            concatenator,
        }
    }

    /// Clips that fail to resolve or download are skipped and listed in
    /// `failed`; filesystem errors stop the whole splice. With nothing
    /// downloaded no output is written and the call still succeeds.
    pub async fn splice(
        &self,
        clips: &[ClipRecord],
        output: &Path,
        working_dir: &Path,
    ) -> Result<SpliceReport, SpliceError> {
        info!("Splicing {} clips", clips.len());
        let mut report = SpliceReport::default();
        if clips.is_empty() {
            info!("No clips to splice");
            return Ok(report);
        }

        let container = OutputContainer::from_path(output)?;
        ensure_destination(working_dir).await?;

        for clip in clips {
            match self.downloader.download(clip, working_dir).await {
                Ok(local) => report.downloaded.push(local),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("Couldn't download clip {}: {}", clip.id, e);
                    report.failed.push(clip.id.clone());
                }
            }
        }
        if !report.failed.is_empty() {
            warn!("Some clips couldn't be downloaded: {:?}", report.failed);
        }

        if report.downloaded.is_empty() {
            info!("No clips to splice");
            return Ok(report);
        }

        let inputs: Vec<PathBuf> = report.downloaded.iter().map(|f| f.path.clone()).collect();
        info!("Writing {} from {} clip(s)", output.display(), inputs.len());
        self.concatenator
            .concatenate(&inputs, output, container.encoder())
            .await?;
        report.output = Some(output.to_path_buf());
        Ok(report)
    }
}
