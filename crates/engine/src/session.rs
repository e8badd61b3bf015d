use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use placement_api::{
    ENDPOINT_ANALYZE, ENDPOINT_GENERATE, ENDPOINT_PROCESS_VIDEO, PlacementClient, ServiceReply,
    TimeSpan,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{DEFAULT_PREVIEW_BUCKET_TL, PreviewFrameCache};
use crate::clip::{ClipBounds, ClipRange, DEFAULT_MIN_CLIP_TL, check_requested_length};
use crate::detection::{DetectionSet, TargetId};
use crate::error::{EngineError, Result};
use crate::media::{FfmpegMediaBackend, MediaBackend, PreviewFrame, ProbedMedia};
use crate::playback::{PlaybackState, PlaybackUpdate};
use crate::service::PlacementService;
use crate::settings::Settings;
use crate::slot::{PreviewSlot, PreviewSource};
use crate::time::ticks_to_seconds;
use crate::timeline::{DragTarget, PointerCapture};
use crate::trim::{TrimmedClip, extract_clip_to_temp};

const PREVIEW_CACHE_CAPACITY: usize = 96;
const NO_TARGETS_NOTE: &str = "No replaceable objects were detected.";

/// Which request a submit sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    /// `/process-video` with a text prompt and optional reference image.
    #[default]
    Prompt,
    /// `/analyze` first, then `/generate` with the selected targets.
    Reference,
}

/// Screen the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Edit,
    Select,
    Result,
}

impl Display for FlowStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Edit => "edit",
            Self::Select => "select",
            Self::Result => "result",
        };
        f.write_str(name)
    }
}

/// Tunables for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub min_clip_tl: i64,
    pub trim_before_upload: bool,
    pub workflow: Workflow,
    pub preview_cache_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_clip_tl: DEFAULT_MIN_CLIP_TL,
            trim_before_upload: true,
            workflow: Workflow::Prompt,
            preview_cache_capacity: PREVIEW_CACHE_CAPACITY,
        }
    }
}

/// Commands accepted by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectVideo {
        path: PathBuf,
    },
    /// Drops the video, any result and every temporary file.
    ClearVideo,
    SelectImage {
        path: Option<PathBuf>,
    },
    SetPrompt {
        text: String,
    },
    SetWorkflow {
        workflow: Workflow,
    },
    SetTrimBeforeUpload {
        enabled: bool,
    },
    /// Moves the playhead without a drag, e.g. a click on the track.
    Scrub {
        t_tl: i64,
    },
    /// Captures the pointer for `target`. Ignored while another drag is active.
    ///
    /// # Example
    /// ```ignore
    /// use std::path::PathBuf;
    /// use engine::{Command, DragTarget};
    ///
    /// let _ = session.handle_command(Command::SelectVideo { path: PathBuf::from("clip.mp4") });
    /// let _ = session.handle_command(Command::BeginDrag { target: DragTarget::Start });
    /// let _ = session.handle_command(Command::DragTo { t_tl: 7_000_000 });
    /// let _ = session.handle_command(Command::EndDrag);
    /// ```
    BeginDrag {
        target: DragTarget,
    },
    DragTo {
        t_tl: i64,
    },
    EndDrag,
    /// Sets the clip range from typed-in bounds; `None` keeps the video edge.
    SetClipRange {
        start_tl: Option<i64>,
        end_tl: Option<i64>,
    },
    Play,
    Pause,
    TogglePlayback,
    SetVolume {
        volume: f32,
    },
    /// Advances the playback clock by wall time elapsed since the last tick.
    Tick {
        elapsed_tl: i64,
    },
    /// Sends the video to `/process-video` or `/analyze`, depending on the workflow.
    Submit,
    ToggleTarget {
        id: TargetId,
    },
    /// Sends the selected targets to `/generate`.
    Generate,
}

/// Events emitted by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionChanged(SessionSnapshot),
    PlayheadChanged { t_tl: i64, playing: bool },
    PreviewFrameReady { t_tl: i64, frame: PreviewFrame },
    RequestFinished { endpoint: &'static str },
    Error(ErrorEvent),
}

/// Coarse error category for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Media,
    Service,
}

impl From<&EngineError> for ErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::Api(_) => Self::Service,
            error if error.is_validation() => Self::Validation,
            _ => Self::Media,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: ErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Immutable session snapshot consumed by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub step: FlowStep,
    pub workflow: Workflow,
    pub prompt: String,
    pub video: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub result_video: Option<PathBuf>,
    /// Duration of the displayed video, once known.
    pub duration_tl: Option<i64>,
    /// Source clip range. `None` while a result is displayed.
    pub clip: Option<ClipRange>,
    pub min_clip_tl: i64,
    pub playhead_tl: i64,
    pub playing: bool,
    pub volume: f32,
    pub trim_before_upload: bool,
    pub target_description: Option<String>,
    pub targets: Vec<TargetSummary>,
    pub note: Option<String>,
    pub error: Option<String>,
}

impl SessionSnapshot {
    pub fn showing_result(&self) -> bool {
        self.result_video.is_some()
    }
}

/// Snapshot of one detected target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSummary {
    pub id: TargetId,
    pub label: String,
    pub description: String,
    pub spans: Vec<TimeSpan>,
    pub visible_seconds: f64,
    pub selected: bool,
}

/// Edit session: one source video, its clip range, the request flow and the
/// current result.
#[derive(Debug)]
pub struct EditSession<M, S> {
    media: M,
    service: S,
    config: SessionConfig,
    step: FlowStep,
    workflow: Workflow,
    prompt: String,
    image: Option<PathBuf>,
    source: PreviewSlot,
    source_media: Option<ProbedMedia>,
    clip: Option<ClipRange>,
    result: PreviewSlot,
    playback: PlaybackState,
    capture: PointerCapture,
    detection: Option<DetectionSet>,
    next_target_id: TargetId,
    uploaded: Option<TrimmedClip>,
    note: Option<String>,
    error: Option<String>,
    preview_cache: PreviewFrameCache,
}

impl<M, S> EditSession<M, S>
where
    M: MediaBackend,
    S: PlacementService,
{
    /// Creates an empty session.
    ///
    /// # Example
    /// ```no_run
    /// use engine::{EditSession, FfmpegMediaBackend, SessionConfig};
    /// use placement_api::PlacementClient;
    ///
    /// let client = PlacementClient::new("http://localhost:5000", None).expect("valid url");
    /// let _session = EditSession::new(FfmpegMediaBackend::default(), client, SessionConfig::default());
    /// ```
    pub fn new(media: M, service: S, config: SessionConfig) -> Self {
        Self {
            media,
            service,
            config,
            step: FlowStep::Edit,
            workflow: config.workflow,
            prompt: String::new(),
            image: None,
            source: PreviewSlot::new("source"),
            source_media: None,
            clip: None,
            result: PreviewSlot::new("result"),
            playback: PlaybackState::default(),
            capture: PointerCapture::default(),
            detection: None,
            next_target_id: 1,
            uploaded: None,
            note: None,
            error: None,
            preview_cache: PreviewFrameCache::new(
                config.preview_cache_capacity,
                DEFAULT_PREVIEW_BUCKET_TL,
            ),
        }
    }

    /// Applies one command and returns emitted events.
    ///
    /// A failed command also fills the session's error slot.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        let result = match command {
            Command::SelectVideo { path } => self.select_video(path),
            Command::ClearVideo => Ok(self.clear_video()),
            Command::SelectImage { path } => {
                self.image = path;
                Ok(vec![self.snapshot_event()])
            }
            Command::SetPrompt { text } => {
                self.prompt = text;
                Ok(vec![self.snapshot_event()])
            }
            Command::SetWorkflow { workflow } => Ok(self.set_workflow(workflow)),
            Command::SetTrimBeforeUpload { enabled } => {
                self.config.trim_before_upload = enabled;
                Ok(vec![self.snapshot_event()])
            }
            Command::Scrub { t_tl } => self.scrub(t_tl),
            Command::BeginDrag { target } => self.begin_drag(target),
            Command::DragTo { t_tl } => self.drag_to(t_tl),
            Command::EndDrag => {
                if let Some(target) = self.capture.release() {
                    debug!(%target, "drag released");
                }
                Ok(Vec::new())
            }
            Command::SetClipRange { start_tl, end_tl } => self.set_clip_range(start_tl, end_tl),
            Command::Play => self.play(),
            Command::Pause => {
                self.playback.pause();
                Ok(vec![self.playhead_event()])
            }
            Command::TogglePlayback => {
                if self.playback.is_playing() {
                    self.playback.pause();
                    Ok(vec![self.playhead_event()])
                } else {
                    self.play()
                }
            }
            Command::SetVolume { volume } => {
                self.playback.set_volume(volume);
                Ok(vec![self.snapshot_event()])
            }
            Command::Tick { elapsed_tl } => Ok(self.tick(elapsed_tl)),
            Command::Submit => self.submit(),
            Command::ToggleTarget { id } => self.toggle_target(id),
            Command::Generate => self.generate(),
        };

        if let Err(error) = &result {
            self.error = Some(error.to_string());
        }
        result
    }

    /// Current state as a snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        let showing_result = self.result.current().is_some();
        let (target_description, targets) = match &self.detection {
            Some(detection) => (
                detection.target_description().map(str::to_owned),
                detection
                    .targets()
                    .iter()
                    .map(|target| TargetSummary {
                        id: target.id,
                        label: target.label.clone(),
                        description: target.description.clone(),
                        spans: target.spans.clone(),
                        visible_seconds: target.visible_seconds(),
                        selected: detection.is_selected(target.id),
                    })
                    .collect(),
            ),
            None => (None, Vec::new()),
        };

        SessionSnapshot {
            step: self.step,
            workflow: self.workflow,
            prompt: self.prompt.clone(),
            video: self.source.path().map(Path::to_path_buf),
            image: self.image.clone(),
            result_video: self.result.path().map(Path::to_path_buf),
            duration_tl: self.playback.duration_tl(),
            clip: if showing_result { None } else { self.clip },
            min_clip_tl: self.config.min_clip_tl,
            playhead_tl: self.playback.position_tl(),
            playing: self.playback.is_playing(),
            volume: self.playback.volume(),
            trim_before_upload: self.config.trim_before_upload,
            target_description,
            targets,
            note: self.note.clone(),
            error: self.error.clone(),
        }
    }

    fn select_video(&mut self, path: PathBuf) -> Result<Vec<Event>> {
        self.discard_result();
        self.discard_detection();
        if let Some(previous) = self.source.path() {
            self.preview_cache.forget(previous);
        }
        self.source.replace(PreviewSource::File(path.clone()))?;
        self.source_media = None;
        self.clip = None;
        self.capture.release();
        self.uploaded = None;
        self.step = FlowStep::Edit;
        self.error = None;
        self.playback.reset(None);

        let probed = self.media.probe(&path)?;
        self.clip = ClipBounds::new(probed.duration_tl, self.config.min_clip_tl)
            .and_then(|bounds| bounds.full_range())
            .ok();
        if self.clip.is_none() {
            debug!(duration_tl = probed.duration_tl, "video shorter than minimum clip");
        }
        info!(path = ?path, duration_tl = probed.duration_tl, "video selected");
        self.show(&probed);
        self.source_media = Some(probed);

        let mut events = vec![self.snapshot_event()];
        events.extend(self.frame_events(false)?);
        Ok(events)
    }

    fn clear_video(&mut self) -> Vec<Event> {
        self.discard_result();
        self.discard_detection();
        self.source.revoke();
        self.source_media = None;
        self.clip = None;
        self.capture.release();
        self.uploaded = None;
        self.step = FlowStep::Edit;
        self.error = None;
        self.playback.reset(None);
        self.preview_cache.clear();
        vec![self.snapshot_event()]
    }

    fn set_workflow(&mut self, workflow: Workflow) -> Vec<Event> {
        if workflow != self.workflow {
            self.workflow = workflow;
            self.discard_detection();
            if self.step == FlowStep::Select {
                self.step = FlowStep::Edit;
            }
        }
        vec![self.snapshot_event()]
    }

    fn scrub(&mut self, t_tl: i64) -> Result<Vec<Event>> {
        if self.playback.duration_tl().is_none() {
            return Err(EngineError::DurationUnknown);
        }
        self.playback.seek(t_tl);
        self.frame_events(true)
    }

    fn begin_drag(&mut self, target: DragTarget) -> Result<Vec<Event>> {
        if self.playback.duration_tl().is_none() {
            return Err(EngineError::DurationUnknown);
        }
        if target != DragTarget::Playhead && (self.showing_result() || self.clip.is_none()) {
            return Err(EngineError::HandleUnavailable { target });
        }
        if !self.capture.begin(target) {
            debug!(%target, active = ?self.capture.active(), "drag ignored, pointer captured");
        }
        Ok(Vec::new())
    }

    /// Every drag step answers with an event so callers can pace their updates.
    fn drag_to(&mut self, t_tl: i64) -> Result<Vec<Event>> {
        let Some(target) = self.capture.active() else {
            return Ok(vec![self.playhead_event()]);
        };
        if target == DragTarget::Playhead {
            return self.scrub(t_tl);
        }

        let (Some(bounds), Some(range)) = (self.source_bounds(), self.clip) else {
            self.capture.release();
            return Err(EngineError::NoClipRange);
        };
        let next = match target {
            DragTarget::Start => bounds.drag_start(range, t_tl),
            _ => bounds.drag_end(range, t_tl),
        };
        self.clip = Some(next);
        Ok(vec![self.snapshot_event()])
    }

    fn set_clip_range(&mut self, start_tl: Option<i64>, end_tl: Option<i64>) -> Result<Vec<Event>> {
        if self.showing_result() {
            return Err(EngineError::HandleUnavailable {
                target: DragTarget::Start,
            });
        }
        let media = self.source_media.as_ref().ok_or(EngineError::MissingVideo)?;
        let bounds = ClipBounds::new(media.duration_tl, self.config.min_clip_tl)?;
        let range = bounds.requested_range(start_tl, end_tl)?;
        debug!(start_tl = range.start_tl(), end_tl = range.end_tl(), "clip range set");
        self.clip = Some(range);
        Ok(vec![self.snapshot_event()])
    }

    fn play(&mut self) -> Result<Vec<Event>> {
        let before = self.playback.position_tl();
        let active = self.active_range();
        if !self.playback.play(active.as_ref()) {
            return Err(EngineError::DurationUnknown);
        }
        if self.playback.position_tl() != before {
            return self.frame_events(false);
        }
        Ok(vec![self.playhead_event()])
    }

    fn tick(&mut self, elapsed_tl: i64) -> Vec<Event> {
        let active = self.active_range();
        match self.playback.advance(elapsed_tl, active.as_ref()) {
            PlaybackUpdate::Unchanged => Vec::new(),
            PlaybackUpdate::Moved(_)
            | PlaybackUpdate::ReturnedToStart(_)
            | PlaybackUpdate::Ended(_) => self.frame_events(false).unwrap_or_default(),
        }
    }

    fn submit(&mut self) -> Result<Vec<Event>> {
        self.error = None;
        let source = self
            .source
            .path()
            .map(Path::to_path_buf)
            .ok_or(EngineError::MissingVideo)?;
        let upload = self.prepare_upload(&source)?;
        let video = upload
            .as_ref()
            .map(|clip| clip.path().to_path_buf())
            .unwrap_or(source);
        let image = self.image.as_deref();

        let (endpoint, reply) = match self.workflow {
            Workflow::Prompt => {
                info!(video = ?video, has_image = image.is_some(), "submitting prompt");
                let reply = self.service.process_video(&video, image, &self.prompt)?;
                (ENDPOINT_PROCESS_VIDEO, reply)
            }
            Workflow::Reference => {
                info!(video = ?video, has_image = image.is_some(), "submitting for analysis");
                (ENDPOINT_ANALYZE, self.service.analyze(&video, image)?)
            }
        };

        self.uploaded = upload;
        let mut events = self.apply_reply(reply)?;
        events.push(Event::RequestFinished { endpoint });
        Ok(events)
    }

    fn generate(&mut self) -> Result<Vec<Event>> {
        if self.step != FlowStep::Select {
            return Err(EngineError::WrongStep {
                expected: FlowStep::Select,
                actual: self.step,
            });
        }
        let targets = self
            .detection
            .as_ref()
            .map(DetectionSet::selected_items)
            .unwrap_or_default();
        if targets.is_empty() {
            return Err(EngineError::NoTargetsSelected);
        }
        let image = self.image.clone().ok_or(EngineError::MissingImage)?;
        let video = match &self.uploaded {
            Some(clip) => clip.path().to_path_buf(),
            None => self
                .source
                .path()
                .map(Path::to_path_buf)
                .ok_or(EngineError::MissingVideo)?,
        };

        self.error = None;
        info!(video = ?video, targets = targets.len(), "generating replacement");
        let reply = self
            .service
            .generate(&video, Some(&image), &targets)?;
        let mut events = self.apply_reply(reply)?;
        events.push(Event::RequestFinished {
            endpoint: ENDPOINT_GENERATE,
        });
        Ok(events)
    }

    fn toggle_target(&mut self, id: TargetId) -> Result<Vec<Event>> {
        if self.step != FlowStep::Select {
            return Err(EngineError::WrongStep {
                expected: FlowStep::Select,
                actual: self.step,
            });
        }
        let Some(detection) = self.detection.as_mut() else {
            return Err(EngineError::UnknownTarget { id });
        };
        let selected = detection.toggle(id)?;
        debug!(id, selected, "target toggled");
        Ok(vec![self.snapshot_event()])
    }

    /// Trims the selected range to a temporary clip when it is narrower
    /// than the video. `None` uploads the source as is.
    fn prepare_upload(&self, source: &Path) -> Result<Option<TrimmedClip>> {
        if !self.config.trim_before_upload {
            return Ok(None);
        }
        let Some(media) = &self.source_media else {
            return Ok(None);
        };

        let (start_tl, end_tl) = self
            .clip
            .map(|range| (range.start_tl(), range.end_tl()))
            .unwrap_or((0, media.duration_tl));
        check_requested_length(start_tl, end_tl, self.config.min_clip_tl)?;
        if start_tl <= 0 && end_tl >= media.duration_tl {
            return Ok(None);
        }

        extract_clip_to_temp(
            &self.media,
            source,
            start_tl,
            end_tl,
            self.config.min_clip_tl,
        )
        .map(Some)
    }

    fn apply_reply(&mut self, reply: ServiceReply) -> Result<Vec<Event>> {
        match reply {
            ServiceReply::Video(payload) => {
                let extension = payload.extension().to_owned();
                if let Some(previous) = self.result.path() {
                    self.preview_cache.forget(previous);
                }
                let path = self
                    .result
                    .replace(PreviewSource::Bytes {
                        bytes: payload.bytes,
                        extension,
                    })?
                    .path()
                    .to_path_buf();
                self.note = payload.note;
                self.step = FlowStep::Result;
                self.capture.release();

                match self.media.probe(&path) {
                    Ok(probed) => self.show(&probed),
                    Err(error) => {
                        warn!(%error, "result metadata failed to load");
                        self.playback.reset(None);
                        self.error = Some(error.to_string());
                    }
                }
                info!(path = ?path, "result ready");
            }
            ServiceReply::Detection(payload) => {
                self.discard_result();
                let detection = DetectionSet::from_payload(payload, &mut self.next_target_id);
                info!(targets = detection.targets().len(), "detection ready");
                self.note = detection
                    .targets()
                    .is_empty()
                    .then(|| NO_TARGETS_NOTE.to_owned());
                self.detection = Some(detection);
                self.step = FlowStep::Select;
                if let Some(probed) = self.source_media.clone() {
                    self.show(&probed);
                }
            }
        }

        let mut events = vec![self.snapshot_event()];
        events.extend(self.frame_events(false)?);
        Ok(events)
    }

    /// Points playback at `probed` and sizes cache buckets to its frame rate.
    fn show(&mut self, probed: &ProbedMedia) {
        self.playback.reset(Some(probed.duration_tl));
        self.preview_cache.set_bucket_size(
            probed
                .frame_duration_tl
                .unwrap_or(DEFAULT_PREVIEW_BUCKET_TL),
        );
    }

    fn discard_result(&mut self) {
        if let Some(previous) = self.result.path() {
            self.preview_cache.forget(previous);
        }
        self.result.revoke();
        self.note = None;
    }

    fn discard_detection(&mut self) {
        self.detection = None;
    }

    fn showing_result(&self) -> bool {
        self.result.current().is_some()
    }

    fn displayed_path(&self) -> Option<PathBuf> {
        self.result
            .path()
            .or_else(|| self.source.path())
            .map(Path::to_path_buf)
    }

    fn source_bounds(&self) -> Option<ClipBounds> {
        let media = self.source_media.as_ref()?;
        ClipBounds::new(media.duration_tl, self.config.min_clip_tl).ok()
    }

    /// Clip range that constrains playback: set, narrower than the video,
    /// and the source is on screen.
    fn active_range(&self) -> Option<ClipRange> {
        if self.showing_result() {
            return None;
        }
        let bounds = self.source_bounds()?;
        self.clip.filter(|range| !bounds.covers_full(range))
    }

    fn snapshot_event(&self) -> Event {
        Event::SessionChanged(self.snapshot())
    }

    fn playhead_event(&self) -> Event {
        Event::PlayheadChanged {
            t_tl: self.playback.position_tl(),
            playing: self.playback.is_playing(),
        }
    }

    /// Playhead event plus a frame of the displayed video.
    ///
    /// With `strict` unset, decode failures are logged and skipped.
    fn frame_events(&mut self, strict: bool) -> Result<Vec<Event>> {
        let t_tl = self.playback.position_tl();
        let mut events = vec![self.playhead_event()];
        let (Some(path), Some(duration_tl)) = (self.displayed_path(), self.playback.duration_tl())
        else {
            return Ok(events);
        };

        // the last frame starts one frame before the end
        let decode_tl = t_tl.min(duration_tl - self.preview_cache.bucket_size_tl()).max(0);
        match self.decode_preview_frame_cached(&path, decode_tl) {
            Ok(frame) => events.push(Event::PreviewFrameReady { t_tl, frame }),
            Err(error) if !strict => {
                warn!(t_tl, path = ?path, %error, "preview decode failed");
            }
            Err(error) => return Err(error),
        }
        Ok(events)
    }

    fn decode_preview_frame_cached(&mut self, path: &Path, t_tl: i64) -> Result<PreviewFrame> {
        if let Some(frame) = self.preview_cache.get(path, t_tl) {
            debug!(t_tl, path = ?path, "preview cache hit");
            return Ok(frame);
        }

        debug!(t_tl, path = ?path, "preview cache miss");
        let frame = self
            .media
            .decode_preview_frame(path, ticks_to_seconds(t_tl))?;
        self.preview_cache.insert(path, t_tl, frame.clone());
        Ok(frame)
    }
}

impl EditSession<FfmpegMediaBackend, PlacementClient> {
    /// Creates a session wired to FFmpeg and the HTTP client described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            settings.media_backend(),
            settings.client()?,
            settings.session_config(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use placement_api::{
        ApiError, DetectedItem, DetectionPayload, ServiceReply, TimeSpan, VideoPayload,
    };

    use super::{Command, EditSession, ErrorKind, ErrorEvent, Event, FlowStep, SessionConfig};
    use super::{SessionSnapshot, Workflow};
    use crate::error::EngineError;
    use crate::test_support::{MockBackend, MockService, ServiceCall};
    use crate::timeline::DragTarget;

    const SECOND: i64 = 1_000_000;

    type TestSession = EditSession<MockBackend, MockService>;

    fn session_with(duration_tl: i64, config: SessionConfig) -> (TestSession, MockBackend, MockService) {
        let backend = MockBackend::with_duration(duration_tl);
        let service = MockService::default();
        let session = EditSession::new(backend.clone(), service.clone(), config);
        (session, backend, service)
    }

    fn session(duration_tl: i64) -> (TestSession, MockBackend, MockService) {
        session_with(duration_tl, SessionConfig::default())
    }

    fn select(session: &mut TestSession, name: &str) -> Vec<Event> {
        session
            .handle_command(Command::SelectVideo {
                path: PathBuf::from(name),
            })
            .expect("select video")
    }

    fn drag(session: &mut TestSession, target: DragTarget, t_tl: i64) {
        session
            .handle_command(Command::BeginDrag { target })
            .expect("begin drag");
        session
            .handle_command(Command::DragTo { t_tl })
            .expect("drag");
        session.handle_command(Command::EndDrag).expect("end drag");
    }

    fn video_reply(bytes: &[u8], note: Option<&str>) -> placement_api::Result<ServiceReply> {
        Ok(ServiceReply::Video(VideoPayload {
            bytes: bytes.to_vec(),
            content_type: Some("video/mp4".to_owned()),
            filename: None,
            note: note.map(str::to_owned),
        }))
    }

    fn detection_reply(labels: &[&str]) -> placement_api::Result<ServiceReply> {
        Ok(ServiceReply::Detection(DetectionPayload {
            target_description: Some("a cola can".to_owned()),
            items: labels
                .iter()
                .map(|label| DetectedItem {
                    label: (*label).to_owned(),
                    description: format!("{label} on the table"),
                    timestamps: vec![TimeSpan {
                        start_time: 1.0,
                        end_time: 2.5,
                    }],
                })
                .collect(),
        }))
    }

    fn last_snapshot(events: &[Event]) -> SessionSnapshot {
        events
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::SessionChanged(snapshot) => Some(snapshot.clone()),
                _ => None,
            })
            .expect("session snapshot event")
    }

    #[test]
    fn selecting_video_loads_full_range_and_first_frame() {
        let (mut session, backend, _service) = session(10 * SECOND);

        let events = select(&mut session, "clip.mp4");

        let snapshot = last_snapshot(&events);
        assert_eq!(snapshot.duration_tl, Some(10 * SECOND));
        let clip = snapshot.clip.expect("clip range");
        assert_eq!((clip.start_tl(), clip.end_tl()), (0, 10 * SECOND));
        assert!(events.contains(&Event::PlayheadChanged {
            t_tl: 0,
            playing: false
        }));
        assert!(
            events
                .iter()
                .any(|event| matches!(event, Event::PreviewFrameReady { t_tl: 0, .. }))
        );
        assert_eq!(backend.decode_calls().len(), 1);
    }

    #[test]
    fn handle_drags_clamp_to_minimum_clip() {
        let (mut session, _backend, _service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");

        drag(&mut session, DragTarget::Start, 7 * SECOND);
        drag(&mut session, DragTarget::End, 8 * SECOND);

        let clip = session.snapshot().clip.expect("clip range");
        assert_eq!(clip.start_tl(), 7 * SECOND);
        assert_eq!(clip.end_tl(), 9 * SECOND);
    }

    #[test]
    fn second_drag_target_is_ignored_while_captured() {
        let (mut session, _backend, _service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");

        session
            .handle_command(Command::BeginDrag {
                target: DragTarget::Start,
            })
            .expect("begin start");
        session
            .handle_command(Command::BeginDrag {
                target: DragTarget::End,
            })
            .expect("second begin is ignored");
        session
            .handle_command(Command::DragTo { t_tl: 3 * SECOND })
            .expect("drag");

        let clip = session.snapshot().clip.expect("clip range");
        assert_eq!(clip.start_tl(), 3 * SECOND);
        assert_eq!(clip.end_tl(), 10 * SECOND);
    }

    #[test]
    fn every_drag_step_is_answered() {
        let (mut session, _backend, _service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");

        let uncaptured = session
            .handle_command(Command::DragTo { t_tl: 3 * SECOND })
            .expect("drag without capture");
        assert_eq!(
            uncaptured,
            vec![Event::PlayheadChanged {
                t_tl: 0,
                playing: false
            }]
        );

        session
            .handle_command(Command::BeginDrag {
                target: DragTarget::End,
            })
            .expect("begin end");
        let unchanged = session
            .handle_command(Command::DragTo { t_tl: 12 * SECOND })
            .expect("drag past the end");
        assert_eq!(last_snapshot(&unchanged).clip, session.snapshot().clip);
    }

    #[test]
    fn typed_clip_range_is_validated_before_upload() {
        let (mut session, backend, service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");

        let result = session.handle_command(Command::SetClipRange {
            start_tl: Some(9 * SECOND),
            end_tl: Some(10 * SECOND),
        });
        assert!(matches!(result, Err(EngineError::ClipTooShort { .. })));
        let result = session.handle_command(Command::SetClipRange {
            start_tl: Some(5 * SECOND),
            end_tl: Some(3 * SECOND),
        });
        assert!(matches!(result, Err(EngineError::InvalidClipRange { .. })));
        let clip = session.snapshot().clip.expect("clip range");
        assert_eq!((clip.start_tl(), clip.end_tl()), (0, 10 * SECOND));

        let events = session
            .handle_command(Command::SetClipRange {
                start_tl: Some(3 * SECOND),
                end_tl: Some(7 * SECOND),
            })
            .expect("valid range");
        let clip = last_snapshot(&events).clip.expect("clip range");
        assert_eq!((clip.start_tl(), clip.end_tl()), (3 * SECOND, 7 * SECOND));

        service.push_reply(video_reply(b"placed", None));
        session.handle_command(Command::Submit).expect("submit");
        let jobs = backend.trim_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            (jobs[0].range.start_tl(), jobs[0].range.end_tl()),
            (3 * SECOND, 7 * SECOND)
        );
    }

    #[test]
    fn short_video_submit_fails_without_request_or_encode() {
        let (mut session, backend, service) = session(1_500_000);
        let events = select(&mut session, "short.mp4");
        assert_eq!(last_snapshot(&events).clip, None);

        let result = session.handle_command(Command::Submit);

        let Err(error) = result else {
            panic!("expected clip too short");
        };
        assert!(matches!(error, EngineError::ClipTooShort { .. }));
        assert!(error.to_string().contains("too short"));
        assert_eq!(ErrorEvent::from_error(&error).kind, ErrorKind::Validation);
        assert!(service.calls().is_empty());
        assert!(backend.trim_jobs().is_empty());
        assert_eq!(session.snapshot().error, Some(error.to_string()));
    }

    #[test]
    fn narrowed_range_uploads_trimmed_clip() {
        let (mut session, backend, service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");
        drag(&mut session, DragTarget::Start, 2 * SECOND);
        drag(&mut session, DragTarget::End, 6 * SECOND);
        session
            .handle_command(Command::SetPrompt {
                text: "a cola can on the desk".to_owned(),
            })
            .expect("set prompt");
        service.push_reply(video_reply(b"rendered", Some("swapped the mug")));

        let events = session.handle_command(Command::Submit).expect("submit");

        let jobs = backend.trim_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].range.start_tl(), 2 * SECOND);
        assert_eq!(jobs[0].range.end_tl(), 6 * SECOND);

        let calls = service.calls();
        let [ServiceCall::Process { video, prompt, .. }] = calls.as_slice() else {
            panic!("expected one process call");
        };
        assert_eq!(video, &jobs[0].output);
        assert_eq!(prompt, "a cola can on the desk");

        let snapshot = last_snapshot(&events);
        assert_eq!(snapshot.step, FlowStep::Result);
        assert_eq!(snapshot.note.as_deref(), Some("swapped the mug"));
        assert_eq!(snapshot.clip, None);
        let result = snapshot.result_video.expect("result video");
        assert_eq!(std::fs::read(&result).expect("read result"), b"rendered");
        assert!(events.contains(&Event::RequestFinished {
            endpoint: "process-video"
        }));
    }

    #[test]
    fn full_range_uploads_source_without_encoding() {
        let (mut session, backend, service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");
        service.push_reply(video_reply(b"rendered", None));

        session.handle_command(Command::Submit).expect("submit");

        assert!(backend.trim_jobs().is_empty());
        assert!(matches!(
            service.calls().as_slice(),
            [ServiceCall::Process { video, .. }] if video == &PathBuf::from("clip.mp4")
        ));
    }

    #[test]
    fn disabled_trim_uploads_source_even_when_range_is_narrow() {
        let config = SessionConfig {
            trim_before_upload: false,
            ..SessionConfig::default()
        };
        let (mut session, backend, service) = session_with(10 * SECOND, config);
        select(&mut session, "clip.mp4");
        drag(&mut session, DragTarget::Start, 4 * SECOND);
        service.push_reply(video_reply(b"rendered", None));

        session.handle_command(Command::Submit).expect("submit");

        assert!(backend.trim_jobs().is_empty());
        assert_eq!(service.calls().len(), 1);
    }

    #[test]
    fn submit_without_video_is_rejected() {
        let (mut session, _backend, service) = session(10 * SECOND);

        let result = session.handle_command(Command::Submit);

        assert!(matches!(result, Err(EngineError::MissingVideo)));
        assert!(service.calls().is_empty());
    }

    #[test]
    fn detection_reply_moves_to_select_with_all_targets_selected() {
        let config = SessionConfig {
            workflow: Workflow::Reference,
            ..SessionConfig::default()
        };
        let (mut session, _backend, service) = session_with(10 * SECOND, config);
        select(&mut session, "clip.mp4");
        session
            .handle_command(Command::SelectImage {
                path: Some(PathBuf::from("can.png")),
            })
            .expect("select image");
        service.push_reply(detection_reply(&["mug", "bottle", "book"]));

        let events = session.handle_command(Command::Submit).expect("submit");

        let snapshot = last_snapshot(&events);
        assert_eq!(snapshot.step, FlowStep::Select);
        assert_eq!(snapshot.target_description.as_deref(), Some("a cola can"));
        assert_eq!(snapshot.targets.len(), 3);
        assert!(snapshot.targets.iter().all(|target| target.selected));
        assert_eq!(snapshot.targets[0].visible_seconds, 1.5);
        assert!(matches!(
            service.calls().as_slice(),
            [ServiceCall::Analyze { image: Some(image), .. }] if image == &PathBuf::from("can.png")
        ));
    }

    #[test]
    fn generate_sends_only_selected_targets() {
        let config = SessionConfig {
            workflow: Workflow::Reference,
            ..SessionConfig::default()
        };
        let (mut session, _backend, service) = session_with(10 * SECOND, config);
        select(&mut session, "clip.mp4");
        service.push_reply(detection_reply(&["mug", "bottle", "book"]));
        session.handle_command(Command::Submit).expect("submit");

        let ids: Vec<u64> = session
            .snapshot()
            .targets
            .iter()
            .map(|target| target.id)
            .collect();
        session
            .handle_command(Command::ToggleTarget { id: ids[1] })
            .expect("toggle");
        let snapshot = session.snapshot();
        assert!(snapshot.targets[0].selected);
        assert!(!snapshot.targets[1].selected);
        assert!(snapshot.targets[2].selected);

        session
            .handle_command(Command::SelectImage {
                path: Some(PathBuf::from("can.png")),
            })
            .expect("select image");
        service.push_reply(video_reply(b"generated", None));
        let events = session.handle_command(Command::Generate).expect("generate");

        let calls = service.calls();
        let ServiceCall::Generate { targets, image, .. } = &calls[1] else {
            panic!("expected generate call");
        };
        let labels: Vec<&str> = targets.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(labels, vec!["mug", "book"]);
        assert_eq!(image.as_deref(), Some(std::path::Path::new("can.png")));
        assert_eq!(last_snapshot(&events).step, FlowStep::Result);
    }

    #[test]
    fn generate_without_image_sends_nothing() {
        let config = SessionConfig {
            workflow: Workflow::Reference,
            ..SessionConfig::default()
        };
        let (mut session, _backend, service) = session_with(10 * SECOND, config);
        select(&mut session, "clip.mp4");
        service.push_reply(detection_reply(&["mug"]));
        session.handle_command(Command::Submit).expect("submit");

        let result = session.handle_command(Command::Generate);

        let Err(error) = result else {
            panic!("expected missing image error");
        };
        assert!(matches!(error, EngineError::MissingImage));
        assert_eq!(ErrorEvent::from_error(&error).kind, ErrorKind::Validation);
        assert_eq!(service.calls().len(), 1);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.step, FlowStep::Select);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Please choose a product image before generating.")
        );
    }

    #[test]
    fn selecting_new_video_after_generate_resets_the_flow() {
        let config = SessionConfig {
            workflow: Workflow::Reference,
            ..SessionConfig::default()
        };
        let (mut session, backend, service) = session_with(10 * SECOND, config);
        backend.set_duration("other", 6 * SECOND);
        select(&mut session, "clip.mp4");
        drag(&mut session, DragTarget::Start, 3 * SECOND);
        session
            .handle_command(Command::SelectImage {
                path: Some(PathBuf::from("can.png")),
            })
            .expect("select image");
        service.push_reply(detection_reply(&["mug", "bottle"]));
        session.handle_command(Command::Submit).expect("submit");
        service.push_reply(video_reply(b"generated", Some("done")));
        session.handle_command(Command::Generate).expect("generate");
        let result = session.snapshot().result_video.expect("result video");
        assert!(result.exists());

        let events = select(&mut session, "other.mp4");

        let snapshot = last_snapshot(&events);
        assert_eq!(snapshot.step, FlowStep::Edit);
        assert!(snapshot.targets.is_empty());
        assert_eq!(snapshot.target_description, None);
        assert_eq!(snapshot.result_video, None);
        assert_eq!(snapshot.note, None);
        assert_eq!(snapshot.duration_tl, Some(6 * SECOND));
        let clip = snapshot.clip.expect("clip range");
        assert_eq!((clip.start_tl(), clip.end_tl()), (0, 6 * SECOND));
        assert!(!result.exists());
        assert!(matches!(
            session.handle_command(Command::Generate),
            Err(EngineError::WrongStep { .. })
        ));
    }

    #[test]
    fn generate_with_nothing_selected_sends_nothing() {
        let config = SessionConfig {
            workflow: Workflow::Reference,
            ..SessionConfig::default()
        };
        let (mut session, _backend, service) = session_with(10 * SECOND, config);
        select(&mut session, "clip.mp4");
        service.push_reply(detection_reply(&["mug"]));
        session.handle_command(Command::Submit).expect("submit");
        let id = session.snapshot().targets[0].id;
        session
            .handle_command(Command::ToggleTarget { id })
            .expect("toggle");

        let result = session.handle_command(Command::Generate);

        assert!(matches!(result, Err(EngineError::NoTargetsSelected)));
        assert_eq!(service.calls().len(), 1);
    }

    #[test]
    fn generate_outside_select_step_is_rejected() {
        let (mut session, _backend, _service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");

        let result = session.handle_command(Command::Generate);

        assert!(matches!(
            result,
            Err(EngineError::WrongStep {
                expected: FlowStep::Select,
                actual: FlowStep::Edit
            })
        ));
    }

    #[test]
    fn backend_failure_keeps_previous_result() {
        let (mut session, _backend, service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");
        service.push_reply(video_reply(b"first", None));
        session.handle_command(Command::Submit).expect("first submit");
        let first = session.snapshot().result_video.expect("first result");

        service.push_reply(Err(ApiError::Backend {
            status: 500,
            message: "GPU busy".to_owned(),
        }));
        let result = session.handle_command(Command::Submit);

        let Err(error) = result else {
            panic!("expected backend failure");
        };
        assert_eq!(error.to_string(), "GPU busy");
        assert_eq!(ErrorEvent::from_error(&error).kind, ErrorKind::Service);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("GPU busy"));
        assert_eq!(snapshot.result_video.as_ref(), Some(&first));
        assert!(first.exists());
    }

    #[test]
    fn new_result_releases_previous_result_file() {
        let (mut session, _backend, service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");
        service.push_reply(video_reply(b"first", None));
        session.handle_command(Command::Submit).expect("first submit");
        let first = session.snapshot().result_video.expect("first result");

        service.push_reply(video_reply(b"second", None));
        session.handle_command(Command::Submit).expect("second submit");
        let second = session.snapshot().result_video.expect("second result");

        assert_ne!(first, second);
        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(session.snapshot().error, None);
    }

    #[test]
    fn clearing_video_releases_result_file() {
        let (mut session, _backend, service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");
        service.push_reply(video_reply(b"first", None));
        session.handle_command(Command::Submit).expect("submit");
        let result = session.snapshot().result_video.expect("result");

        let events = session
            .handle_command(Command::ClearVideo)
            .expect("clear video");

        let snapshot = last_snapshot(&events);
        assert_eq!(snapshot.video, None);
        assert_eq!(snapshot.result_video, None);
        assert_eq!(snapshot.step, FlowStep::Edit);
        assert!(!result.exists());
    }

    #[test]
    fn handles_are_unavailable_while_result_is_shown() {
        let (mut session, _backend, service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");
        service.push_reply(video_reply(b"rendered", None));
        session.handle_command(Command::Submit).expect("submit");

        let result = session.handle_command(Command::BeginDrag {
            target: DragTarget::Start,
        });

        assert!(matches!(
            result,
            Err(EngineError::HandleUnavailable {
                target: DragTarget::Start
            })
        ));
    }

    #[test]
    fn playback_leaving_range_returns_to_start_paused() {
        let (mut session, _backend, _service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");
        drag(&mut session, DragTarget::Start, 2 * SECOND);
        drag(&mut session, DragTarget::End, 5 * SECOND);

        let events = session.handle_command(Command::Play).expect("play");
        assert!(events.contains(&Event::PlayheadChanged {
            t_tl: 2 * SECOND,
            playing: true
        }));

        let events = session
            .handle_command(Command::Tick {
                elapsed_tl: 2 * SECOND,
            })
            .expect("tick");
        assert!(events.contains(&Event::PlayheadChanged {
            t_tl: 4 * SECOND,
            playing: true
        }));

        let events = session
            .handle_command(Command::Tick {
                elapsed_tl: 2 * SECOND,
            })
            .expect("tick");
        assert!(events.contains(&Event::PlayheadChanged {
            t_tl: 2 * SECOND,
            playing: false
        }));
    }

    #[test]
    fn ticks_while_paused_emit_nothing() {
        let (mut session, _backend, _service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");

        let events = session
            .handle_command(Command::Tick { elapsed_tl: SECOND })
            .expect("tick");

        assert!(events.is_empty());
    }

    #[test]
    fn scrub_reuses_cached_frames_within_one_frame() {
        let (mut session, backend, _service) = session(10 * SECOND);
        select(&mut session, "clip.mp4");

        session
            .handle_command(Command::Scrub { t_tl: 3_000_000 })
            .expect("scrub");
        session
            .handle_command(Command::Scrub { t_tl: 3_010_000 })
            .expect("scrub");

        assert_eq!(backend.decode_calls().len(), 2);
    }

    #[test]
    fn metadata_failure_leaves_duration_unknown() {
        let (mut session, _backend, _service) = session(10 * SECOND);

        let result = session.handle_command(Command::SelectVideo {
            path: PathBuf::from("broken.mp4"),
        });
        assert!(matches!(result, Err(EngineError::MetadataLoad { .. })));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.video, Some(PathBuf::from("broken.mp4")));
        assert_eq!(snapshot.duration_tl, None);
        assert!(snapshot.error.is_some());
        assert!(matches!(
            session.handle_command(Command::Scrub { t_tl: SECOND }),
            Err(EngineError::DurationUnknown)
        ));
    }

    #[test]
    fn volume_is_clamped() {
        let (mut session, _backend, _service) = session(10 * SECOND);

        let events = session
            .handle_command(Command::SetVolume { volume: 3.0 })
            .expect("set volume");

        assert_eq!(last_snapshot(&events).volume, 1.0);
    }
}
