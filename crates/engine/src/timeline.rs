use std::fmt::{Display, Formatter};

use crate::clip::ClipRange;
use crate::time::TICKS_PER_SECOND;

const MIN_TICK_MARKS: i64 = 4;
const MAX_TICK_MARKS: i64 = 12;
const SECONDS_PER_TICK_MARK: i64 = 4;

/// Converts an x coordinate in timeline space to a time in ticks.
///
/// The left edge maps to `0` and the right edge to `duration_tl`. Positions
/// outside the track are clamped.
///
/// # Example
/// ```
/// use engine::timeline::time_from_x;
///
/// assert_eq!(time_from_x(0.0, 200.0, 1_000), 0);
/// assert_eq!(time_from_x(100.0, 200.0, 1_000), 500);
/// assert_eq!(time_from_x(250.0, 200.0, 1_000), 1_000);
/// ```
pub fn time_from_x(x: f32, width: f32, duration_tl: i64) -> i64 {
    if duration_tl <= 0 || width <= 0.0 || !x.is_finite() {
        return 0;
    }

    let ratio = f64::from(x.clamp(0.0, width) / width);
    ((ratio * duration_tl as f64).round() as i64).clamp(0, duration_tl)
}

/// Inverse of [`time_from_x`].
pub fn x_from_time(t_tl: i64, duration_tl: i64, width: f32) -> f32 {
    if duration_tl <= 0 {
        return 0.0;
    }
    (t_tl.clamp(0, duration_tl) as f32 / duration_tl as f32) * width
}

/// What a pointer press on the timeline grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragTarget {
    Playhead,
    Start,
    End,
}

impl Display for DragTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Playhead => "playhead",
            Self::Start => "start handle",
            Self::End => "end handle",
        };
        f.write_str(name)
    }
}

/// Exclusive pointer capture: at most one drag target is active at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PointerCapture {
    active: Option<DragTarget>,
}

impl PointerCapture {
    /// Captures `target`. Returns false if another drag is already active.
    pub fn begin(&mut self, target: DragTarget) -> bool {
        match self.active {
            Some(active) => active == target,
            None => {
                self.active = Some(target);
                true
            }
        }
    }

    pub fn active(&self) -> Option<DragTarget> {
        self.active
    }

    /// Ends the active drag.
    pub fn release(&mut self) -> Option<DragTarget> {
        self.active.take()
    }
}

/// Picks the drag target under `x`.
///
/// Handles win when within `tolerance_px`; the closer handle wins when both
/// are in reach. Anywhere else grabs the playhead.
pub fn hit_test(
    x: f32,
    width: f32,
    duration_tl: i64,
    range: Option<&ClipRange>,
    tolerance_px: f32,
) -> DragTarget {
    let Some(range) = range else {
        return DragTarget::Playhead;
    };

    let start_distance = (x - x_from_time(range.start_tl(), duration_tl, width)).abs();
    let end_distance = (x - x_from_time(range.end_tl(), duration_tl, width)).abs();
    match (start_distance <= tolerance_px, end_distance <= tolerance_px) {
        (true, true) if end_distance < start_distance => DragTarget::End,
        (true, _) => DragTarget::Start,
        (false, true) => DragTarget::End,
        (false, false) => DragTarget::Playhead,
    }
}

/// One labelled tick mark under the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickMark {
    pub at_tl: i64,
    pub label_seconds: i64,
}

/// Evenly spaced tick marks: one per four seconds, between four and twelve.
///
/// # Example
/// ```
/// use engine::timeline::tick_marks;
///
/// let marks = tick_marks(30_000_000);
/// assert_eq!(marks.len(), 8);
/// assert_eq!(marks[1].label_seconds, 4);
/// ```
pub fn tick_marks(duration_tl: i64) -> Vec<TickMark> {
    if duration_tl <= 0 {
        return Vec::new();
    }

    let whole_seconds = (duration_tl + TICKS_PER_SECOND - 1) / TICKS_PER_SECOND;
    let count = ((whole_seconds + SECONDS_PER_TICK_MARK - 1) / SECONDS_PER_TICK_MARK)
        .clamp(MIN_TICK_MARKS, MAX_TICK_MARKS);
    (0..count)
        .map(|index| {
            let at_tl = duration_tl * index / count;
            TickMark {
                at_tl,
                label_seconds: (at_tl as f64 / TICKS_PER_SECOND as f64).round() as i64,
            }
        })
        .collect()
}
