use std::path::Path;
use std::process::Command;

use crate::error::{MediaFfmpegError, Result};
use crate::probe::probe_media;

/// One decoded still frame in packed RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Decodes the frame shown at `at_seconds`, downscaled to at most `max_width`.
///
/// Seeking happens before the input so FFmpeg decodes from the nearest
/// keyframe and discards frames up to the requested position.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::decode_frame_at_seconds;
///
/// let frame = decode_frame_at_seconds("sample.mp4", 0.5, 640).expect("decode should succeed");
/// assert!(frame.width <= 640);
/// ```
pub fn decode_frame_at_seconds(
    path: impl AsRef<Path>,
    at_seconds: f64,
    max_width: u32,
) -> Result<DecodedFrame> {
    if !at_seconds.is_finite() || at_seconds < 0.0 {
        return Err(MediaFfmpegError::InvalidTimestampSeconds(at_seconds));
    }

    let path = path.as_ref();
    let media = probe_media(path)?;
    let video = media
        .first_video()
        .ok_or_else(|| MediaFfmpegError::MissingVideoStream(path.to_path_buf()))?;
    let (Some(src_width), Some(src_height)) = (video.width, video.height) else {
        return Err(MediaFfmpegError::MissingVideoDimensions(path.to_path_buf()));
    };
    let (width, height) = scaled_dimensions(src_width, src_height, max_width);

    let filter = format!("scale={width}:{height},format=rgba");
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-v", "error", "-ss"])
        .arg(format!("{at_seconds:.6}"))
        .arg("-i")
        .arg(path)
        .args(["-frames:v", "1", "-vf"])
        .arg(&filter)
        .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffmpeg frame decode",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffmpeg decode frame {}", path.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let expected = width as usize * height as usize * 4;
    if output.stdout.len() != expected {
        return Err(MediaFfmpegError::Parse {
            context: "decoded rgba size",
            value: format!("expected {expected} bytes, got {}", output.stdout.len()),
        });
    }

    Ok(DecodedFrame {
        width,
        height,
        rgba: output.stdout,
    })
}

/// Fits `width x height` into `max_width`, keeping both sides even.
fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if max_width == 0 || width <= max_width {
        return (even(width), even(height));
    }
    let scaled_height = (u64::from(height) * u64::from(max_width) / u64::from(width)) as u32;
    (even(max_width), even(scaled_height))
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}
