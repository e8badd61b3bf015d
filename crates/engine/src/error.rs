use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::session::FlowStep;
use crate::time::ticks_to_seconds;
use crate::timeline::DragTarget;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by session commands, clip planning and the media pipeline.
#[derive(Debug)]
pub enum EngineError {
    MissingVideo,
    MissingImage,
    DurationUnknown,
    NoClipRange,
    ClipTooShort {
        length_tl: i64,
        min_clip_tl: i64,
    },
    InvalidClipRange {
        start_tl: i64,
        end_tl: i64,
        duration_tl: i64,
    },
    InvalidMinimumClip {
        min_clip_tl: i64,
    },
    NoTargetsSelected,
    UnknownTarget {
        id: u64,
    },
    WrongStep {
        expected: FlowStep,
        actual: FlowStep,
    },
    HandleUnavailable {
        target: DragTarget,
    },
    MetadataLoad {
        path: PathBuf,
        source: media_ffmpeg::MediaFfmpegError,
    },
    PreviewDecode {
        path: PathBuf,
        source: media_ffmpeg::MediaFfmpegError,
    },
    TrimEncode {
        source: media_ffmpeg::MediaFfmpegError,
    },
    EmptyTrimOutput {
        path: PathBuf,
    },
    PreviewIo {
        context: &'static str,
        source: std::io::Error,
    },
    Api(placement_api::ApiError),
}

impl EngineError {
    /// True for errors caught before any request or encode starts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingVideo
                | Self::MissingImage
                | Self::DurationUnknown
                | Self::NoClipRange
                | Self::ClipTooShort { .. }
                | Self::InvalidClipRange { .. }
                | Self::InvalidMinimumClip { .. }
                | Self::NoTargetsSelected
                | Self::UnknownTarget { .. }
                | Self::WrongStep { .. }
                | Self::HandleUnavailable { .. }
        )
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVideo => write!(f, "Please upload a video before processing."),
            Self::MissingImage => write!(f, "Please choose a product image before generating."),
            Self::DurationUnknown => write!(f, "video duration is not known yet"),
            Self::NoClipRange => write!(f, "no clip range is available for this video"),
            Self::ClipTooShort {
                length_tl,
                min_clip_tl,
            } => write!(
                f,
                "clip is too short: {:.2}s selected, at least {:.2}s required",
                ticks_to_seconds(*length_tl),
                ticks_to_seconds(*min_clip_tl)
            ),
            Self::InvalidClipRange {
                start_tl,
                end_tl,
                duration_tl,
            } => write!(
                f,
                "invalid clip range {start_tl}..{end_tl} for duration {duration_tl}"
            ),
            Self::InvalidMinimumClip { min_clip_tl } => {
                write!(f, "minimum clip length must be positive, got {min_clip_tl}")
            }
            Self::NoTargetsSelected => write!(f, "select at least one target to replace"),
            Self::UnknownTarget { id } => write!(f, "unknown detection target {id}"),
            Self::WrongStep { expected, actual } => {
                write!(f, "expected the {expected} step, session is in {actual}")
            }
            Self::HandleUnavailable { target } => {
                write!(f, "{target} cannot be dragged right now")
            }
            Self::MetadataLoad { path, source } => write!(
                f,
                "failed to load video metadata for {}: {source}",
                path.display()
            ),
            Self::PreviewDecode { path, source } => write!(
                f,
                "failed to decode preview frame of {}: {source}",
                path.display()
            ),
            Self::TrimEncode { source } => write!(f, "failed to encode trimmed clip: {source}"),
            Self::EmptyTrimOutput { path } => {
                write!(f, "trimmed clip is empty: {}", path.display())
            }
            Self::PreviewIo { context, source } => write!(f, "{context}: {source}"),
            Self::Api(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MetadataLoad { source, .. } => Some(source),
            Self::PreviewDecode { source, .. } => Some(source),
            Self::TrimEncode { source } => Some(source),
            Self::PreviewIo { source, .. } => Some(source),
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl From<placement_api::ApiError> for EngineError {
    fn from(value: placement_api::ApiError) -> Self {
        Self::Api(value)
    }
}
