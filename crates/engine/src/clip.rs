use crate::error::{EngineError, Result};
use crate::time::TICKS_PER_SECOND;

/// Default minimum clip length: two seconds.
pub const DEFAULT_MIN_CLIP_TL: i64 = 2 * TICKS_PER_SECOND;

/// Selected sub-interval of a source video in timeline ticks.
///
/// A range always satisfies `0 <= start < end <= duration` and
/// `end - start >= min_clip` for the bounds that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRange {
    start_tl: i64,
    end_tl: i64,
}

impl ClipRange {
    pub fn start_tl(&self) -> i64 {
        self.start_tl
    }

    pub fn end_tl(&self) -> i64 {
        self.end_tl
    }

    pub fn len_tl(&self) -> i64 {
        self.end_tl - self.start_tl
    }

    /// Returns true when `t_tl` lies inside `[start, end)`.
    pub fn contains(&self, t_tl: i64) -> bool {
        self.start_tl <= t_tl && t_tl < self.end_tl
    }
}

/// Duration and minimum length a [`ClipRange`] is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipBounds {
    duration_tl: i64,
    min_clip_tl: i64,
}

impl ClipBounds {
    /// Creates bounds for a video of `duration_tl` ticks.
    ///
    /// A video shorter than the minimum is still accepted here; it simply
    /// has no valid full range.
    pub fn new(duration_tl: i64, min_clip_tl: i64) -> Result<Self> {
        if min_clip_tl <= 0 {
            return Err(EngineError::InvalidMinimumClip { min_clip_tl });
        }
        if duration_tl <= 0 {
            return Err(EngineError::DurationUnknown);
        }
        Ok(Self {
            duration_tl,
            min_clip_tl,
        })
    }

    pub fn duration_tl(&self) -> i64 {
        self.duration_tl
    }

    pub fn min_clip_tl(&self) -> i64 {
        self.min_clip_tl
    }

    /// Range covering the whole video, or [`EngineError::ClipTooShort`].
    ///
    /// # Example
    /// ```
    /// use engine::{ClipBounds, DEFAULT_MIN_CLIP_TL};
    ///
    /// let bounds = ClipBounds::new(10_000_000, DEFAULT_MIN_CLIP_TL).unwrap();
    /// let range = bounds.full_range().unwrap();
    /// assert_eq!((range.start_tl(), range.end_tl()), (0, 10_000_000));
    ///
    /// let short = ClipBounds::new(1_500_000, DEFAULT_MIN_CLIP_TL).unwrap();
    /// assert!(short.full_range().is_err());
    /// ```
    pub fn full_range(&self) -> Result<ClipRange> {
        self.range(0, self.duration_tl)
    }

    /// Validates an explicit range.
    pub fn range(&self, start_tl: i64, end_tl: i64) -> Result<ClipRange> {
        if start_tl < 0 || end_tl > self.duration_tl || start_tl >= end_tl {
            return Err(EngineError::InvalidClipRange {
                start_tl,
                end_tl,
                duration_tl: self.duration_tl,
            });
        }
        if end_tl - start_tl < self.min_clip_tl {
            return Err(EngineError::ClipTooShort {
                length_tl: end_tl - start_tl,
                min_clip_tl: self.min_clip_tl,
            });
        }
        Ok(ClipRange { start_tl, end_tl })
    }

    /// Returns true when `range` spans the whole video.
    pub fn covers_full(&self, range: &ClipRange) -> bool {
        range.start_tl <= 0 && range.end_tl >= self.duration_tl
    }

    /// Moves the start handle to `requested_tl`, clamped to `[0, end - min]`.
    pub fn drag_start(&self, range: ClipRange, requested_tl: i64) -> ClipRange {
        let upper = (range.end_tl - self.min_clip_tl).max(0);
        ClipRange {
            start_tl: requested_tl.clamp(0, upper),
            end_tl: range.end_tl,
        }
    }

    /// Moves the end handle to `requested_tl`, clamped to `[start + min, duration]`.
    pub fn drag_end(&self, range: ClipRange, requested_tl: i64) -> ClipRange {
        let lower = (range.start_tl + self.min_clip_tl).min(self.duration_tl);
        ClipRange {
            start_tl: range.start_tl,
            end_tl: requested_tl.clamp(lower, self.duration_tl),
        }
    }

    /// Fits a requested trim into these bounds.
    ///
    /// Both ends are clamped into `[0, duration]`. When clamping leaves less
    /// than the minimum length, the end is extended toward the duration and
    /// then the start is pulled back so the range keeps the minimum length.
    ///
    /// # Example
    /// ```
    /// use engine::{ClipBounds, DEFAULT_MIN_CLIP_TL};
    ///
    /// let bounds = ClipBounds::new(10_000_000, DEFAULT_MIN_CLIP_TL).unwrap();
    /// let planned = bounds.fit_trim(9_000_000, 12_000_000).unwrap();
    /// assert_eq!((planned.start_tl(), planned.end_tl()), (8_000_000, 10_000_000));
    /// ```
    pub fn fit_trim(&self, requested_start_tl: i64, requested_end_tl: i64) -> Result<ClipRange> {
        if self.duration_tl < self.min_clip_tl {
            return Err(EngineError::ClipTooShort {
                length_tl: self.duration_tl,
                min_clip_tl: self.min_clip_tl,
            });
        }

        let mut start_tl = requested_start_tl.clamp(0, self.duration_tl);
        let mut end_tl = requested_end_tl.clamp(0, self.duration_tl);
        if end_tl - start_tl < self.min_clip_tl {
            end_tl = (start_tl + self.min_clip_tl).min(self.duration_tl);
            start_tl = start_tl.min(end_tl - self.min_clip_tl);
        }
        self.range(start_tl, end_tl)
    }

    /// Range typed in by the user; a missing bound means the video edge.
    ///
    /// A reversed or too short request is rejected as given. Only bounds
    /// outside `[0, duration]` are clamped, and the clamped range must still
    /// meet the minimum.
    pub fn requested_range(&self, start_tl: Option<i64>, end_tl: Option<i64>) -> Result<ClipRange> {
        let start_tl = start_tl.unwrap_or(0);
        let end_tl = end_tl.unwrap_or(self.duration_tl);
        if end_tl <= start_tl {
            return Err(EngineError::InvalidClipRange {
                start_tl,
                end_tl,
                duration_tl: self.duration_tl,
            });
        }
        check_requested_length(start_tl, end_tl, self.min_clip_tl)?;

        self.range(
            start_tl.clamp(0, self.duration_tl),
            end_tl.clamp(0, self.duration_tl),
        )
    }
}

/// Rejects a requested trim shorter than `min_clip_tl` before any media work.
pub fn check_requested_length(start_tl: i64, end_tl: i64, min_clip_tl: i64) -> Result<()> {
    let length_tl = end_tl.saturating_sub(start_tl);
    if length_tl < min_clip_tl {
        return Err(EngineError::ClipTooShort {
            length_tl,
            min_clip_tl,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ClipBounds, DEFAULT_MIN_CLIP_TL, check_requested_length};
    use crate::error::EngineError;

    const SECOND: i64 = 1_000_000;

    fn ten_seconds() -> ClipBounds {
        ClipBounds::new(10 * SECOND, DEFAULT_MIN_CLIP_TL).expect("valid bounds")
    }

    #[test]
    fn start_handle_stops_min_clip_before_end() {
        let bounds = ten_seconds();
        let range = bounds.full_range().expect("full range");

        let range = bounds.drag_start(range, 7 * SECOND);
        assert_eq!(range.start_tl(), 7 * SECOND);
        assert_eq!(range.end_tl(), 10 * SECOND);

        let range = bounds.drag_start(range, 9_500_000);
        assert_eq!(range.start_tl(), 8 * SECOND);
    }

    #[test]
    fn end_handle_stops_min_clip_after_start() {
        let bounds = ten_seconds();
        let range = bounds.drag_start(bounds.full_range().expect("full range"), 7 * SECOND);

        let range = bounds.drag_end(range, 8 * SECOND);
        assert_eq!(range.end_tl(), 9 * SECOND);

        let range = bounds.drag_end(range, 42 * SECOND);
        assert_eq!(range.end_tl(), 10 * SECOND);
    }

    #[test]
    fn handles_clamp_outside_the_video() {
        let bounds = ten_seconds();
        let range = bounds.full_range().expect("full range");
        assert_eq!(bounds.drag_start(range, -SECOND).start_tl(), 0);
        assert_eq!(bounds.drag_end(range, 11 * SECOND).end_tl(), 10 * SECOND);
    }

    #[test]
    fn fit_trim_keeps_min_length_inside_duration() {
        let bounds = ten_seconds();
        let planned = bounds.fit_trim(-5 * SECOND, -SECOND).expect("planned");
        assert_eq!((planned.start_tl(), planned.end_tl()), (0, 2 * SECOND));

        let planned = bounds.fit_trim(3 * SECOND, 6 * SECOND).expect("planned");
        assert_eq!((planned.start_tl(), planned.end_tl()), (3 * SECOND, 6 * SECOND));
    }

    #[test]
    fn fit_trim_fails_when_video_is_shorter_than_minimum() {
        let bounds = ClipBounds::new(1_500_000, DEFAULT_MIN_CLIP_TL).expect("valid bounds");
        assert!(matches!(
            bounds.fit_trim(0, 1_500_000),
            Err(EngineError::ClipTooShort {
                length_tl: 1_500_000,
                ..
            })
        ));
    }

    #[test]
    fn requested_length_is_checked_against_minimum() {
        assert!(check_requested_length(0, 2 * SECOND, DEFAULT_MIN_CLIP_TL).is_ok());
        assert!(matches!(
            check_requested_length(0, 1_500_000, DEFAULT_MIN_CLIP_TL),
            Err(EngineError::ClipTooShort { .. })
        ));
    }

    #[test]
    fn requested_range_rejects_short_or_reversed_input() {
        let bounds = ten_seconds();

        assert!(matches!(
            bounds.requested_range(Some(9 * SECOND), Some(10 * SECOND)),
            Err(EngineError::ClipTooShort {
                length_tl: SECOND,
                ..
            })
        ));
        assert!(matches!(
            bounds.requested_range(Some(5 * SECOND), Some(3 * SECOND)),
            Err(EngineError::InvalidClipRange { .. })
        ));
        assert!(matches!(
            bounds.requested_range(Some(9 * SECOND), Some(12 * SECOND)),
            Err(EngineError::ClipTooShort { .. })
        ));
    }

    #[test]
    fn requested_range_clamps_edges_and_fills_missing_bounds() {
        let bounds = ten_seconds();

        let range = bounds
            .requested_range(Some(-SECOND), Some(4 * SECOND))
            .expect("clamped start");
        assert_eq!((range.start_tl(), range.end_tl()), (0, 4 * SECOND));

        let range = bounds
            .requested_range(Some(6 * SECOND), None)
            .expect("open end");
        assert_eq!((range.start_tl(), range.end_tl()), (6 * SECOND, 10 * SECOND));

        let range = bounds
            .requested_range(None, Some(15 * SECOND))
            .expect("clamped end");
        assert_eq!((range.start_tl(), range.end_tl()), (0, 10 * SECOND));
    }

    #[test]
    fn rejects_non_positive_minimum_and_duration() {
        assert!(matches!(
            ClipBounds::new(SECOND, 0),
            Err(EngineError::InvalidMinimumClip { .. })
        ));
        assert!(matches!(
            ClipBounds::new(0, DEFAULT_MIN_CLIP_TL),
            Err(EngineError::DurationUnknown)
        ));
    }
}
