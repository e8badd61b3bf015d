use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::error::{MediaFfmpegError, Result};
use crate::time::Rational;

/// Stream kind reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// Stream metadata read from ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub kind: StreamKind,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<Rational>,
    pub duration_seconds: Option<f64>,
}

/// Probe result for one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub streams: Vec<StreamInfo>,
    pub duration_seconds: Option<f64>,
}

impl MediaInfo {
    /// Returns the first video stream.
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Video)
    }

    /// Returns true when any audio stream is present.
    pub fn has_audio(&self) -> bool {
        self.streams
            .iter()
            .any(|stream| stream.kind == StreamKind::Audio)
    }

    /// Container duration, falling back to the longest stream duration.
    pub fn best_duration_seconds(&self) -> Option<f64> {
        self.duration_seconds.or_else(|| {
            self.streams
                .iter()
                .filter_map(|stream| stream.duration_seconds)
                .fold(None, |best: Option<f64>, value| {
                    Some(best.map_or(value, |current| current.max(value)))
                })
        })
    }
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
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probes a media file with `ffprobe -of json`.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::probe_media;
///
/// let info = probe_media("sample.mp4").expect("probe should succeed");
/// assert!(info.first_video().is_some());
/// ```
pub fn probe_media(path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,width,height,r_frame_rate,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffprobe {}", path.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let info = parse_probe_json(path, &output.stdout)?;
    debug!(
        path = %path.display(),
        streams = info.streams.len(),
        duration = ?info.duration_seconds,
        "probed media"
    );
    Ok(info)
}

fn parse_probe_json(path: &Path, bytes: &[u8]) -> Result<MediaInfo> {
    let parsed: ProbeOutput =
        serde_json::from_slice(bytes).map_err(|source| MediaFfmpegError::Json {
            context: "ffprobe output",
            source,
        })?;

    if parsed.streams.is_empty() {
        return Err(MediaFfmpegError::Parse {
            context: "streams",
            value: "no streams found".to_string(),
        });
    }

    let mut streams = Vec::with_capacity(parsed.streams.len());
    for stream in parsed.streams {
        let kind = match stream.codec_type.as_deref() {
            Some("video") => StreamKind::Video,
            Some("audio") => StreamKind::Audio,
            _ => StreamKind::Other,
        };
        let frame_rate = match stream.r_frame_rate.as_deref() {
            Some(raw) => Rational::parse(raw)?,
            None => None,
        };
        streams.push(StreamInfo {
            kind,
            width: stream.width,
            height: stream.height,
            frame_rate,
            duration_seconds: parse_seconds(stream.duration.as_deref(), "stream duration")?,
        });
    }

    let duration_seconds = match parsed.format {
        Some(format) => parse_seconds(format.duration.as_deref(), "format duration")?,
        None => None,
    };

    Ok(MediaInfo {
        path: path.to_path_buf(),
        streams,
        duration_seconds,
    })
}

fn parse_seconds(raw: Option<&str>, context: &'static str) -> Result<Option<f64>> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }
    let value = raw.parse::<f64>().map_err(|_| MediaFfmpegError::Parse {
        context,
        value: raw.to_string(),
    })?;
    Ok(value.is_finite().then_some(value))
}
