use std::path::PathBuf;
use std::sync::mpsc::TrySendError;
use std::time::Duration;

use engine::timeline::DragTarget;
use engine::{
    Command, Event, FlowStep, SessionSnapshot, TargetId, Workflow, format_clock, seconds_to_ticks,
    ticks_to_seconds,
};
use iced::time::{self, Instant};
use iced::widget::{
    Column, button, canvas, checkbox, column, container, radio, row, slider, text, text_input,
};
use iced::{Element, Length, Subscription, Task};

use crate::bridge::{BridgeEvent, EngineCommandSender, engine_subscription};
use crate::widgets::preview::{self, PreviewImage};
use crate::widgets::timeline::{self, TimelineInput};

const PLAYBACK_TICK_INTERVAL: Duration = Duration::from_millis(40);

/// UI messages handled by the iced app update loop.
#[derive(Debug, Clone)]
pub enum Message {
    VideoPathChanged(String),
    LoadVideoPressed,
    ClearVideoPressed,
    ImagePathChanged(String),
    PromptChanged(String),
    WorkflowSelected(Workflow),
    TrimToggled(bool),
    SubmitPressed,
    TargetToggled(TargetId),
    GeneratePressed,
    PlayPausePressed,
    VolumeChanged(f32),
    Timeline(TimelineInput),
    Tick(Instant),
    Bridge(BridgeEvent),
}

/// Root UI state.
pub struct AppState {
    engine_tx: Option<EngineCommandSender>,
    session: Option<SessionSnapshot>,
    video_path: String,
    image_path: String,
    prompt: String,
    playhead_tl: i64,
    playing: bool,
    volume: f32,
    preview: Option<PreviewImage>,
    /// Request currently blocking the session thread.
    busy: Option<&'static str>,
    /// Commands sent to the session thread that it has not finished yet.
    unanswered_commands: usize,
    /// Unanswered commands queued before the busy request.
    commands_ahead_of_busy: usize,
    pending_drag_tl: Option<i64>,
    drag_request_in_flight: bool,
    tick_request_in_flight: bool,
    last_tick: Option<Instant>,
    timeline_cache: canvas::Cache,
    status: String,
}

impl AppState {
    /// Boots the app; the session bridge starts with the subscription.
    pub fn boot() -> (Self, Task<Message>) {
        (Self::with_sender(None, "starting session"), Task::none())
    }

    fn with_sender(engine_tx: Option<EngineCommandSender>, status: &str) -> Self {
        Self {
            engine_tx,
            session: None,
            video_path: String::new(),
            image_path: String::new(),
            prompt: String::new(),
            playhead_tl: 0,
            playing: false,
            volume: 1.0,
            preview: None,
            busy: None,
            unanswered_commands: 0,
            commands_ahead_of_busy: 0,
            pending_drag_tl: None,
            drag_request_in_flight: false,
            tick_request_in_flight: false,
            last_tick: None,
            timeline_cache: canvas::Cache::new(),
            status: status.to_owned(),
        }
    }

    /// Handles one UI message.
    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::VideoPathChanged(path) => {
                self.video_path = path;
            }
            Message::LoadVideoPressed => {
                let path = self.video_path.trim().to_owned();
                if path.is_empty() {
                    self.status = String::from("video path is empty");
                } else if self.idle()
                    && self.send_command(Command::SelectVideo {
                        path: PathBuf::from(&path),
                    })
                {
                    self.preview = None;
                    self.status = format!("loading {path}");
                }
            }
            Message::ClearVideoPressed => {
                if self.idle() && self.send_command(Command::ClearVideo) {
                    self.preview = None;
                    self.status = String::from("video cleared");
                }
            }
            Message::ImagePathChanged(path) => {
                self.image_path = path;
            }
            Message::PromptChanged(prompt) => {
                self.prompt = prompt;
            }
            Message::WorkflowSelected(workflow) => {
                if self.idle() {
                    self.send_command(Command::SetWorkflow { workflow });
                }
            }
            Message::TrimToggled(enabled) => {
                if self.idle() {
                    self.send_command(Command::SetTrimBeforeUpload { enabled });
                }
            }
            Message::SubmitPressed => self.submit(),
            Message::TargetToggled(id) => {
                if self.idle() {
                    self.send_command(Command::ToggleTarget { id });
                }
            }
            Message::GeneratePressed => {
                if self.idle() && self.send_command(Command::Generate) {
                    self.mark_busy("generate");
                    self.status = String::from("generating placement");
                }
            }
            Message::PlayPausePressed => {
                self.tick_request_in_flight = false;
                self.last_tick = None;
                self.send_command(Command::TogglePlayback);
            }
            Message::VolumeChanged(volume) => {
                self.volume = volume;
                self.send_command(Command::SetVolume { volume });
            }
            Message::Timeline(input) => self.apply_timeline_input(input),
            Message::Tick(now) => self.tick(now),
            Message::Bridge(BridgeEvent::Ready(sender)) => {
                self.engine_tx = Some(sender);
                self.unanswered_commands = 0;
                self.status = String::from("session ready");
                self.flush_drag_request();
            }
            Message::Bridge(BridgeEvent::Event(event)) => {
                self.apply_engine_event(event);
            }
            Message::Bridge(BridgeEvent::CommandDone) => self.command_done(),
            Message::Bridge(BridgeEvent::Disconnected) => {
                self.status = String::from("session event channel closed");
                self.engine_tx = None;
                self.busy = None;
                self.unanswered_commands = 0;
                self.commands_ahead_of_busy = 0;
                self.playing = false;
                self.pending_drag_tl = None;
                self.drag_request_in_flight = false;
                self.tick_request_in_flight = false;
            }
        }

        Task::none()
    }

    fn idle(&self) -> bool {
        self.busy.is_none()
    }

    /// Must be called right after the request was sent.
    fn mark_busy(&mut self, request: &'static str) {
        self.busy = Some(request);
        self.commands_ahead_of_busy = self.unanswered_commands.saturating_sub(1);
    }

    fn command_done(&mut self) {
        self.unanswered_commands = self.unanswered_commands.saturating_sub(1);
        if self.busy.is_none() {
            return;
        }
        if self.commands_ahead_of_busy == 0 {
            self.busy = None;
        } else {
            self.commands_ahead_of_busy -= 1;
        }
    }

    fn submit(&mut self) {
        if !self.idle() {
            return;
        }

        let image = self.image_path.trim();
        let image = (!image.is_empty()).then(|| PathBuf::from(image));
        let sent = self.send_command(Command::SelectImage { path: image })
            && self.send_command(Command::SetPrompt {
                text: self.prompt.clone(),
            })
            && self.send_command(Command::Submit);
        if sent {
            self.mark_busy("submit");
            self.status = String::from("uploading video");
        }
    }

    fn apply_timeline_input(&mut self, input: TimelineInput) {
        if !self.idle() {
            return;
        }
        match input {
            TimelineInput::Pressed { target, t_tl } => {
                self.pending_drag_tl = None;
                if !self.send_command(Command::BeginDrag { target }) {
                    return;
                }
                if target == DragTarget::Playhead {
                    self.playhead_tl = t_tl;
                }
                self.queue_drag(t_tl);
            }
            TimelineInput::Dragged { t_tl } => self.queue_drag(t_tl),
            TimelineInput::Released => {
                if let Some(t_tl) = self.pending_drag_tl.take() {
                    self.send_command(Command::DragTo { t_tl });
                }
                self.send_command(Command::EndDrag);
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        if !self.playing || !self.idle() {
            self.last_tick = None;
            return;
        }
        if self.tick_request_in_flight {
            return;
        }
        let Some(last) = self.last_tick.replace(now) else {
            return;
        };

        let elapsed_tl = seconds_to_ticks(now.saturating_duration_since(last).as_secs_f64());
        if self.send_command(Command::Tick { elapsed_tl }) {
            self.tick_request_in_flight = true;
        }
    }

    fn send_command(&mut self, command: Command) -> bool {
        if let Some(sender) = &self.engine_tx {
            match sender.try_send(command) {
                Ok(()) => {
                    self.unanswered_commands += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    self.status = String::from("session command queue is full");
                    false
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.status = String::from("session command channel closed");
                    self.engine_tx = None;
                    self.drag_request_in_flight = false;
                    self.tick_request_in_flight = false;
                    false
                }
            }
        } else {
            self.status = String::from("session is not ready");
            false
        }
    }

    fn queue_drag(&mut self, t_tl: i64) {
        self.pending_drag_tl = Some(t_tl);
        self.flush_drag_request();
    }

    fn flush_drag_request(&mut self) {
        if self.drag_request_in_flight {
            return;
        }

        let Some(t_tl) = self.pending_drag_tl.take() else {
            return;
        };

        if let Some(sender) = &self.engine_tx {
            match sender.try_send(Command::DragTo { t_tl }) {
                Ok(()) => {
                    self.unanswered_commands += 1;
                    self.drag_request_in_flight = true;
                }
                Err(TrySendError::Full(_)) => {
                    self.pending_drag_tl = Some(t_tl);
                    self.status = String::from("session command queue is full");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.status = String::from("session command channel closed");
                    self.engine_tx = None;
                    self.drag_request_in_flight = false;
                }
            }
        } else {
            self.pending_drag_tl = Some(t_tl);
            self.status = String::from("session is not ready");
        }
    }

    fn drag_answered(&mut self) {
        self.drag_request_in_flight = false;
        self.flush_drag_request();
    }

    fn apply_engine_event(&mut self, event: Event) {
        match event {
            Event::SessionChanged(snapshot) => {
                self.playhead_tl = snapshot.playhead_tl;
                self.playing = snapshot.playing;
                self.volume = snapshot.volume;
                if snapshot.video.is_none() {
                    self.preview = None;
                }
                self.session = Some(snapshot);
                self.timeline_cache.clear();
                self.drag_answered();
            }
            Event::PlayheadChanged { t_tl, playing } => {
                self.playhead_tl = t_tl;
                self.playing = playing;
                if !playing {
                    self.last_tick = None;
                }
                self.tick_request_in_flight = false;
                self.drag_answered();
            }
            Event::PreviewFrameReady { frame, .. } => {
                self.preview = PreviewImage::from_frame(&frame);
            }
            Event::RequestFinished { endpoint } => {
                self.status = format!("/{endpoint} finished");
            }
            Event::Error(error) => {
                self.status = format!("error: {}", error.message);
                self.tick_request_in_flight = false;
                self.drag_answered();
            }
        }
    }

    /// Renders the UI tree.
    pub fn view(&self) -> Element<'_, Message> {
        let idle = self.idle();
        let session = self.session.as_ref();
        let has_video = session.is_some_and(|snapshot| snapshot.video.is_some());
        let duration_tl = session.and_then(|snapshot| snapshot.duration_tl);

        let video_row = row![
            text_input("video file", &self.video_path)
                .on_input(Message::VideoPathChanged)
                .on_submit(Message::LoadVideoPressed),
            button("Load").on_press_maybe(idle.then_some(Message::LoadVideoPressed)),
            button("Clear").on_press_maybe((idle && has_video).then_some(Message::ClearVideoPressed)),
        ]
        .spacing(8);

        let placeholder = if has_video {
            "decoding preview"
        } else {
            "Load a video to preview"
        };
        let preview_area = container(preview::view(self.preview.as_ref(), placeholder))
            .width(Length::Fill)
            .height(Length::Fixed(360.0));

        let play_label = if self.playing { "Pause" } else { "Play" };
        let transport = row![
            button(play_label)
                .on_press_maybe((idle && duration_tl.is_some()).then_some(Message::PlayPausePressed)),
            text(format!(
                "{} / {}",
                format_clock(self.playhead_tl),
                format_clock(duration_tl.unwrap_or(0))
            )),
            text("Volume"),
            slider(0.0..=1.0, self.volume, Message::VolumeChanged)
                .step(0.05)
                .width(Length::Fixed(120.0)),
        ]
        .spacing(12);

        let timeline = timeline::view(
            session,
            self.playhead_tl,
            idle,
            &self.timeline_cache,
            Message::Timeline,
        );

        let mut content = column![video_row, preview_area, transport, timeline]
            .spacing(12)
            .padding(16);

        if let Some(snapshot) = session {
            content = content.push(text(clip_summary(snapshot)));
            content = content.push(self.request_panel(snapshot));
            if snapshot.step == FlowStep::Select {
                content = content.push(target_panel(snapshot, idle));
            }
            if let Some(note) = &snapshot.note {
                content = content.push(text(note.clone()));
            }
            if let Some(result) = &snapshot.result_video {
                content = content.push(text(format!("Result: {}", result.display())));
            }
            if let Some(error) = &snapshot.error {
                content = content.push(text(format!("Error: {error}")));
            }
        }

        content
            .push(text(format!("Status: {}", self.status)))
            .into()
    }

    fn request_panel<'a>(&'a self, snapshot: &'a SessionSnapshot) -> Element<'a, Message> {
        let idle = self.idle();
        let workflow = row![
            radio(
                "Prompt",
                Workflow::Prompt,
                Some(snapshot.workflow),
                Message::WorkflowSelected
            ),
            radio(
                "Pick objects",
                Workflow::Reference,
                Some(snapshot.workflow),
                Message::WorkflowSelected
            ),
        ]
        .spacing(16);

        let trim = checkbox("Upload only the selected range", snapshot.trim_before_upload);
        let trim = if idle {
            trim.on_toggle(Message::TrimToggled)
        } else {
            trim
        };

        let mut panel = column![workflow, trim].spacing(8);
        if snapshot.workflow == Workflow::Prompt {
            panel = panel.push(
                text_input("describe the placement", &self.prompt).on_input(Message::PromptChanged),
            );
        }

        let submit_label = match (self.busy, snapshot.workflow) {
            (Some(_), _) => "Working...",
            (None, Workflow::Prompt) => "Process video",
            (None, Workflow::Reference) => "Detect objects",
        };
        panel
            .push(
                row![
                    text_input("product image (optional)", &self.image_path)
                        .on_input(Message::ImagePathChanged),
                    button(submit_label).on_press_maybe(
                        (idle && snapshot.video.is_some()).then_some(Message::SubmitPressed)
                    ),
                ]
                .spacing(8),
            )
            .into()
    }

    /// Subscribes to bridge events, plus playback ticks while playing.
    pub fn subscription(&self) -> Subscription<Message> {
        let bridge = engine_subscription().map(Message::Bridge);
        if self.playing && self.idle() {
            Subscription::batch([bridge, time::every(PLAYBACK_TICK_INTERVAL).map(Message::Tick)])
        } else {
            bridge
        }
    }

    #[cfg(test)]
    fn from_sender_for_test(engine_tx: EngineCommandSender) -> Self {
        Self::with_sender(Some(engine_tx), "idle")
    }
}

fn clip_summary(snapshot: &SessionSnapshot) -> String {
    if snapshot.showing_result() {
        return String::from("Showing result");
    }
    match (snapshot.clip, snapshot.duration_tl) {
        (Some(clip), _) => format!(
            "Selected {} - {} ({:.1} s)",
            format_clock(clip.start_tl()),
            format_clock(clip.end_tl()),
            ticks_to_seconds(clip.len_tl())
        ),
        (None, Some(_)) => format!(
            "Video is shorter than the {:.1} s minimum clip",
            ticks_to_seconds(snapshot.min_clip_tl)
        ),
        (None, None) => String::from("No video loaded"),
    }
}

fn target_panel(snapshot: &SessionSnapshot, idle: bool) -> Element<'_, Message> {
    let mut panel = Column::new().spacing(6);
    if let Some(description) = &snapshot.target_description {
        panel = panel.push(text(format!("Product: {description}")));
    }

    for target in &snapshot.targets {
        let id = target.id;
        let label = format!(
            "{}: {} ({:.1} s visible)",
            target.label, target.description, target.visible_seconds
        );
        let entry = checkbox(label, target.selected);
        let entry = if idle {
            entry.on_toggle(move |_| Message::TargetToggled(id))
        } else {
            entry
        };
        panel = panel.push(entry);
    }

    let any_selected = snapshot.targets.iter().any(|target| target.selected);
    panel
        .push(
            button("Generate")
                .on_press_maybe((idle && any_selected).then_some(Message::GeneratePressed)),
        )
        .into()
}
