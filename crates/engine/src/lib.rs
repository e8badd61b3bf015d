//! UI-agnostic edit session for the product-placement client.

pub mod cache;
pub mod clip;
pub mod detection;
pub mod error;
pub mod media;
pub mod playback;
pub mod service;
pub mod session;
pub mod settings;
pub mod slot;
#[cfg(test)]
mod test_support;
pub mod time;
pub mod timeline;
pub mod trim;

pub use clip::{ClipBounds, ClipRange, DEFAULT_MIN_CLIP_TL};
pub use detection::{DetectionSet, TargetId};
pub use error::{EngineError, Result};
pub use media::{FfmpegMediaBackend, MediaBackend, PreviewFrame, ProbedMedia, TrimJob};
pub use service::PlacementService;
pub use session::{
    Command, EditSession, ErrorEvent, ErrorKind, Event, FlowStep, SessionConfig, SessionSnapshot,
    TargetSummary, Workflow,
};
pub use settings::Settings;
pub use time::{TICKS_PER_SECOND, format_clock, seconds_to_ticks, ticks_to_seconds};
pub use timeline::DragTarget;
