use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::error::{MediaFfmpegError, Result};

/// Re-encodes `[start_seconds, end_seconds)` of `input` into `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipTrimRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub include_audio: bool,
}

/// Trims one clip by seek -> decode -> re-encode into an MP4.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use media_ffmpeg::{ClipTrimRequest, trim_clip};
///
/// trim_clip(&ClipTrimRequest {
///     input: PathBuf::from("in.mp4"),
///     output: PathBuf::from("out.mp4"),
///     start_seconds: 2.0,
///     end_seconds: 6.5,
///     include_audio: true,
/// })
/// .expect("trim should succeed");
/// ```
pub fn trim_clip(request: &ClipTrimRequest) -> Result<()> {
    validate_request(request)?;
    let args = build_trim_args(request);

    info!(
        input = %request.input.display(),
        output = %request.output.display(),
        start = request.start_seconds,
        end = request.end_seconds,
        "trimming clip"
    );
    let output = Command::new("ffmpeg")
        .args(&args)
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffmpeg trim",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffmpeg trim {}", request.output.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

fn build_trim_args(request: &ClipTrimRequest) -> Vec<OsString> {
    let duration = request.end_seconds - request.start_seconds;
    let mut args: Vec<OsString> = ["-hide_banner", "-v", "error", "-y", "-ss"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(format!("{:.6}", request.start_seconds).into());
    args.push("-i".into());
    args.push(request.input.clone().into_os_string());
    args.push("-t".into());
    args.push(format!("{duration:.6}").into());
    args.extend(
        ["-map", "0:v:0", "-c:v", "libx264", "-pix_fmt", "yuv420p"]
            .into_iter()
            .map(OsString::from),
    );
    if request.include_audio {
        args.extend(["-map", "0:a:0?", "-c:a", "aac"].into_iter().map(OsString::from));
    } else {
        args.push("-an".into());
    }
    args.extend(["-movflags", "+faststart"].into_iter().map(OsString::from));
    args.push(request.output.clone().into_os_string());
    args
}

fn validate_request(request: &ClipTrimRequest) -> Result<()> {
    if !request.start_seconds.is_finite() || !request.end_seconds.is_finite() {
        return Err(MediaFfmpegError::InvalidTrimRequest {
            reason: "trim bounds must be finite",
        });
    }
    if request.start_seconds < 0.0 {
        return Err(MediaFfmpegError::InvalidTrimRequest {
            reason: "trim start is negative",
        });
    }
    if request.end_seconds <= request.start_seconds {
        return Err(MediaFfmpegError::InvalidTrimRequest {
            reason: "trim range is not positive",
        });
    }
    if request.input == request.output {
        return Err(MediaFfmpegError::InvalidTrimRequest {
            reason: "trim output would overwrite its input",
        });
    }
    Ok(())
}
