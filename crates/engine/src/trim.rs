use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::info;

use crate::clip::{ClipBounds, ClipRange, check_requested_length};
use crate::error::{EngineError, Result};
use crate::media::{MediaBackend, TrimJob};

/// A trimmed clip written to `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimOutcome {
    pub range: ClipRange,
    pub output: PathBuf,
    pub bytes: u64,
}

/// Trimmed clip owned by a temporary file, deleted on drop.
#[derive(Debug)]
pub struct TrimmedClip {
    pub range: ClipRange,
    path: TempPath,
}

impl TrimmedClip {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Re-encodes `[requested_start_tl, requested_end_tl)` of `input` into `output`.
///
/// The requested length is checked before anything touches the file. The
/// true duration is then probed and the range fitted into it with
/// [`ClipBounds::fit_trim`]. An encode that writes nothing is an error.
///
/// # Example
/// ```no_run
/// use std::path::Path;
///
/// use engine::trim::extract_clip;
/// use engine::{DEFAULT_MIN_CLIP_TL, FfmpegMediaBackend};
///
/// let outcome = extract_clip(
///     &FfmpegMediaBackend::default(),
///     Path::new("input.mp4"),
///     1_000_000,
///     4_000_000,
///     DEFAULT_MIN_CLIP_TL,
///     Path::new("clip.mp4"),
/// )
/// .expect("trim should succeed");
/// assert!(outcome.bytes > 0);
/// ```
pub fn extract_clip<M>(
    media: &M,
    input: &Path,
    requested_start_tl: i64,
    requested_end_tl: i64,
    min_clip_tl: i64,
    output: &Path,
) -> Result<TrimOutcome>
where
    M: MediaBackend + ?Sized,
{
    check_requested_length(requested_start_tl, requested_end_tl, min_clip_tl)?;

    let probed = media.probe(input)?;
    let bounds = ClipBounds::new(probed.duration_tl, min_clip_tl)?;
    let range = bounds.fit_trim(requested_start_tl, requested_end_tl)?;

    media.trim(&TrimJob {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        range,
        include_audio: probed.has_audio,
    })?;

    let bytes = std::fs::metadata(output)
        .map_err(|source| EngineError::PreviewIo {
            context: "failed to read trimmed clip",
            source,
        })?
        .len();
    if bytes == 0 {
        return Err(EngineError::EmptyTrimOutput {
            path: output.to_path_buf(),
        });
    }

    info!(
        input = ?input,
        output = ?output,
        start_tl = range.start_tl(),
        end_tl = range.end_tl(),
        bytes,
        "clip trimmed"
    );
    Ok(TrimOutcome {
        range,
        output: output.to_path_buf(),
        bytes,
    })
}

/// Like [`extract_clip`], writing into a fresh temporary `.mp4`.
pub fn extract_clip_to_temp<M>(
    media: &M,
    input: &Path,
    requested_start_tl: i64,
    requested_end_tl: i64,
    min_clip_tl: i64,
) -> Result<TrimmedClip>
where
    M: MediaBackend + ?Sized,
{
    check_requested_length(requested_start_tl, requested_end_tl, min_clip_tl)?;

    let path = tempfile::Builder::new()
        .prefix("placement-clip-")
        .suffix(".mp4")
        .tempfile()
        .map_err(|source| EngineError::PreviewIo {
            context: "failed to create clip file",
            source,
        })?
        .into_temp_path();
    let outcome = extract_clip(
        media,
        input,
        requested_start_tl,
        requested_end_tl,
        min_clip_tl,
        &path,
    )?;
    Ok(TrimmedClip {
        range: outcome.range,
        path,
    })
}
