mod decode;
mod error;
mod probe;
mod time;
mod trim;

pub use decode::{DecodedFrame, decode_frame_at_seconds};
pub use error::{MediaFfmpegError, Result};
pub use probe::{MediaInfo, StreamInfo, StreamKind, probe_media};
pub use time::Rational;
pub use trim::{ClipTrimRequest, trim_clip};
