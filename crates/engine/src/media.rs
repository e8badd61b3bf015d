use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clip::ClipRange;
use crate::error::{EngineError, Result};
use crate::time::{TICKS_PER_SECOND, seconds_to_ticks, ticks_to_seconds};

/// Default width cap for decoded preview frames.
pub const DEFAULT_PREVIEW_MAX_WIDTH: u32 = 960;

/// RGBA preview frame passed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub bytes: Arc<[u8]>,
}

/// Metadata the session needs from one video file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedMedia {
    pub path: PathBuf,
    pub duration_tl: i64,
    /// Duration of one frame, when the frame rate is known.
    pub frame_duration_tl: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_audio: bool,
}

/// One re-encode of `range` from `input` into `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub range: ClipRange,
    pub include_audio: bool,
}

/// Media operations required by the engine.
pub trait MediaBackend {
    /// Loads duration and stream metadata.
    fn probe(&self, path: &Path) -> Result<ProbedMedia>;

    /// Decodes one preview frame around `at_seconds`.
    fn decode_preview_frame(&self, path: &Path, at_seconds: f64) -> Result<PreviewFrame>;

    /// Re-encodes the range described by `job`.
    fn trim(&self, job: &TrimJob) -> Result<()>;
}

/// FFmpeg CLI-backed backend used by production wiring.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegMediaBackend {
    pub max_preview_width: u32,
}

impl Default for FfmpegMediaBackend {
    fn default() -> Self {
        Self {
            max_preview_width: DEFAULT_PREVIEW_MAX_WIDTH,
        }
    }
}

impl MediaBackend for FfmpegMediaBackend {
    fn probe(&self, path: &Path) -> Result<ProbedMedia> {
        let info = media_ffmpeg::probe_media(path).map_err(|source| EngineError::MetadataLoad {
            path: path.to_path_buf(),
            source,
        })?;
        probed_media_from_info(path, &info)
    }

    fn decode_preview_frame(&self, path: &Path, at_seconds: f64) -> Result<PreviewFrame> {
        let decoded =
            media_ffmpeg::decode_frame_at_seconds(path, at_seconds, self.max_preview_width)
                .map_err(|source| EngineError::PreviewDecode {
                    path: path.to_path_buf(),
                    source,
                })?;
        Ok(PreviewFrame {
            width: decoded.width,
            height: decoded.height,
            bytes: decoded.rgba.into(),
        })
    }

    fn trim(&self, job: &TrimJob) -> Result<()> {
        let request = media_ffmpeg::ClipTrimRequest {
            input: job.input.clone(),
            output: job.output.clone(),
            start_seconds: ticks_to_seconds(job.range.start_tl()),
            end_seconds: ticks_to_seconds(job.range.end_tl()),
            include_audio: job.include_audio,
        };
        media_ffmpeg::trim_clip(&request).map_err(|source| EngineError::TrimEncode { source })
    }
}

/// Converts ffprobe output; a missing or zero duration fails as `MetadataLoad`.
fn probed_media_from_info(path: &Path, info: &media_ffmpeg::MediaInfo) -> Result<ProbedMedia> {
    let metadata_error = |source| EngineError::MetadataLoad {
        path: path.to_path_buf(),
        source,
    };
    let video = info.first_video().ok_or_else(|| {
        metadata_error(media_ffmpeg::MediaFfmpegError::MissingVideoStream(
            path.to_path_buf(),
        ))
    })?;
    let duration_tl = info
        .best_duration_seconds()
        .map(seconds_to_ticks)
        .filter(|duration| *duration > 0)
        .ok_or_else(|| {
            metadata_error(media_ffmpeg::MediaFfmpegError::Parse {
                context: "video duration",
                value: match info.best_duration_seconds() {
                    Some(seconds) => format!("{seconds}s"),
                    None => "not reported by ffprobe".to_owned(),
                },
            })
        })?;

    Ok(ProbedMedia {
        path: info.path.clone(),
        duration_tl,
        frame_duration_tl: video.frame_rate.map(frame_duration_tl_from_frame_rate),
        width: video.width,
        height: video.height,
        has_audio: info.has_audio(),
    })
}

pub(crate) fn frame_duration_tl_from_frame_rate(frame_rate: media_ffmpeg::Rational) -> i64 {
    let numerator = i128::from(TICKS_PER_SECOND) * i128::from(frame_rate.den);
    let denominator = i128::from(frame_rate.num.max(1));
    let rounded = (numerator + denominator / 2) / denominator;
    rounded.clamp(1, i128::from(i64::MAX)) as i64
}
