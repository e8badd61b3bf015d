use engine::timeline::{DragTarget, hit_test, tick_marks, time_from_x, x_from_time};
use engine::{ClipRange, SessionSnapshot};
use iced::widget::canvas::{self, Path, Stroke};
use iced::widget::container;
use iced::{Color, Element, Length, Pixels, Point, Rectangle, Size, Theme, mouse};

const HANDLE_TOLERANCE_PX: f32 = 8.0;
const HANDLE_WIDTH_PX: f32 = 6.0;
const TRACK_TOP: f32 = 6.0;
const TICK_LABEL_BAND: f32 = 16.0;

/// Pointer input produced by the timeline canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineInput {
    Pressed { target: DragTarget, t_tl: i64 },
    Dragged { t_tl: i64 },
    Released,
}

/// Local pointer capture; mirrors the session's exclusive drag.
#[derive(Debug, Default)]
struct TimelineState {
    dragging: Option<DragTarget>,
}

#[derive(Debug)]
struct TimelineProgram<'a, Message> {
    duration_tl: i64,
    playhead_tl: i64,
    clip: Option<ClipRange>,
    enabled: bool,
    cache: &'a canvas::Cache,
    on_input: fn(TimelineInput) -> Message,
}

impl<Message> TimelineProgram<'_, Message> {
    fn interactive(&self) -> bool {
        self.enabled && self.duration_tl > 0
    }

    fn track_height(&self, bounds: Rectangle) -> f32 {
        (bounds.height - TRACK_TOP - TICK_LABEL_BAND).max(1.0)
    }
}

impl<Message> canvas::Program<Message> for TimelineProgram<'_, Message> {
    type State = TimelineState;

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        if !self.interactive() {
            state.dragging = None;
            return (canvas::event::Status::Ignored, None);
        }

        let cursor_x = cursor.position().map(|position| position.x - bounds.x);
        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if state.dragging.is_some() || !cursor.is_over(bounds) {
                    return (canvas::event::Status::Ignored, None);
                }
                let Some(x) = cursor_x else {
                    return (canvas::event::Status::Ignored, None);
                };
                let target = hit_test(
                    x,
                    bounds.width,
                    self.duration_tl,
                    self.clip.as_ref(),
                    HANDLE_TOLERANCE_PX,
                );
                state.dragging = Some(target);
                let t_tl = time_from_x(x, bounds.width, self.duration_tl);
                (
                    canvas::event::Status::Captured,
                    Some((self.on_input)(TimelineInput::Pressed { target, t_tl })),
                )
            }
            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                if state.dragging.take().is_some() {
                    (
                        canvas::event::Status::Captured,
                        Some((self.on_input)(TimelineInput::Released)),
                    )
                } else {
                    (canvas::event::Status::Ignored, None)
                }
            }
            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) if state.dragging.is_some() => {
                let Some(x) = cursor_x else {
                    return (canvas::event::Status::Ignored, None);
                };
                let t_tl = time_from_x(x, bounds.width, self.duration_tl);
                (
                    canvas::event::Status::Captured,
                    Some((self.on_input)(TimelineInput::Dragged { t_tl })),
                )
            }
            _ => (canvas::event::Status::Ignored, None),
        }
    }

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<canvas::Geometry> {
        let track_height = self.track_height(bounds);
        let track = self.cache.draw(renderer, bounds.size(), |frame| {
            let background = Path::rectangle(Point::ORIGIN, frame.size());
            frame.fill(&background, Color::from_rgb8(22, 24, 29));

            let lane = Path::rectangle(
                Point::new(0.0, TRACK_TOP),
                Size::new(bounds.width, track_height),
            );
            frame.fill(&lane, Color::from_rgb8(38, 42, 51));

            if self.duration_tl <= 0 {
                return;
            }

            if let Some(clip) = self.clip {
                let start_x = x_from_time(clip.start_tl(), self.duration_tl, bounds.width);
                let end_x = x_from_time(clip.end_tl(), self.duration_tl, bounds.width);
                let selected = Path::rectangle(
                    Point::new(start_x, TRACK_TOP),
                    Size::new((end_x - start_x).max(1.0), track_height),
                );
                frame.fill(&selected, Color::from_rgb8(55, 110, 188));

                for x in [start_x, end_x] {
                    let left = (x - HANDLE_WIDTH_PX / 2.0).clamp(0.0, bounds.width - HANDLE_WIDTH_PX);
                    let handle = Path::rectangle(
                        Point::new(left, TRACK_TOP - 2.0),
                        Size::new(HANDLE_WIDTH_PX, track_height + 4.0),
                    );
                    frame.fill(&handle, Color::from_rgb8(240, 240, 240));
                }
            }

            let label_y = TRACK_TOP + track_height + 2.0;
            for mark in tick_marks(self.duration_tl) {
                let x = x_from_time(mark.at_tl, self.duration_tl, bounds.width);
                let line = Path::line(
                    Point::new(x, label_y - 4.0),
                    Point::new(x, label_y),
                );
                frame.stroke(
                    &line,
                    Stroke::default()
                        .with_width(1.0)
                        .with_color(Color::from_rgb8(120, 126, 138)),
                );
                frame.fill_text(canvas::Text {
                    content: format!("{}s", mark.label_seconds),
                    position: Point::new(x + 2.0, label_y),
                    color: Color::from_rgb8(150, 156, 168),
                    size: Pixels(11.0),
                    ..canvas::Text::default()
                });
            }
        });

        let mut playhead_frame = canvas::Frame::new(renderer, bounds.size());
        if self.duration_tl > 0 {
            let x = x_from_time(self.playhead_tl, self.duration_tl, bounds.width);
            let line = Path::line(
                Point::new(x, 0.0),
                Point::new(x, TRACK_TOP + track_height),
            );
            playhead_frame.stroke(
                &line,
                Stroke::default()
                    .with_width(2.0)
                    .with_color(Color::from_rgb8(255, 94, 77)),
            );
        }

        vec![track, playhead_frame.into_geometry()]
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if !self.interactive() {
            return mouse::Interaction::None;
        }
        if state.dragging.is_some() {
            return mouse::Interaction::Grabbing;
        }
        let Some(position) = cursor.position_over(bounds) else {
            return mouse::Interaction::None;
        };
        match hit_test(
            position.x - bounds.x,
            bounds.width,
            self.duration_tl,
            self.clip.as_ref(),
            HANDLE_TOLERANCE_PX,
        ) {
            DragTarget::Playhead => mouse::Interaction::Pointer,
            DragTarget::Start | DragTarget::End => mouse::Interaction::ResizingHorizontally,
        }
    }
}

/// Renders the timeline: selected range, handles, tick marks and playhead.
///
/// Input is disabled while `enabled` is false, e.g. during a request.
pub fn view<'a, Message>(
    snapshot: Option<&'a SessionSnapshot>,
    playhead_tl: i64,
    enabled: bool,
    cache: &'a canvas::Cache,
    on_input: fn(TimelineInput) -> Message,
) -> Element<'a, Message>
where
    Message: 'a,
{
    let (duration_tl, clip) = match snapshot {
        Some(session) => (session.duration_tl.unwrap_or(0), session.clip),
        None => (0, None),
    };

    container(
        canvas::Canvas::new(TimelineProgram {
            duration_tl,
            playhead_tl,
            clip,
            enabled,
            cache,
            on_input,
        })
        .width(Length::Fill)
        .height(Length::Fixed(64.0)),
    )
    .width(Length::Fill)
    .into()
}
