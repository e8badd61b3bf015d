use crate::clip::ClipRange;

/// Playback clock of the displayed video.
///
/// The engine has no audio output; `volume` is kept so the UI can round-trip it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    position_tl: i64,
    duration_tl: Option<i64>,
    playing: bool,
    volume: f32,
}

/// What a clock update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackUpdate {
    Moved(i64),
    /// Playback left the active range and was parked at its start.
    ReturnedToStart(i64),
    /// Playback reached the end of the video and paused.
    Ended(i64),
    Unchanged,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position_tl: 0,
            duration_tl: None,
            playing: false,
            volume: 1.0,
        }
    }
}

impl PlaybackState {
    pub fn position_tl(&self) -> i64 {
        self.position_tl
    }

    pub fn duration_tl(&self) -> Option<i64> {
        self.duration_tl
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Loads a new video: playhead to zero, paused, volume kept.
    pub fn reset(&mut self, duration_tl: Option<i64>) {
        self.position_tl = 0;
        self.duration_tl = duration_tl.filter(|duration| *duration > 0);
        self.playing = false;
    }

    /// Moves the playhead, clamped to `[0, duration]`.
    pub fn seek(&mut self, t_tl: i64) -> i64 {
        self.position_tl = match self.duration_tl {
            Some(duration) => t_tl.clamp(0, duration),
            None => 0,
        };
        self.position_tl
    }

    /// Clamps to `[0, 1]`; non-finite input is ignored.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        if volume.is_finite() {
            self.volume = volume.clamp(0.0, 1.0);
        }
        self.volume
    }

    /// Starts playback. Returns false when no duration is known.
    ///
    /// With an active range, playback starts from the range start unless the
    /// playhead is already inside it. Without one, playback at the very end
    /// restarts from zero.
    pub fn play(&mut self, active_range: Option<&ClipRange>) -> bool {
        let Some(duration) = self.duration_tl else {
            return false;
        };
        match active_range {
            Some(range) if !range.contains(self.position_tl) => {
                self.position_tl = range.start_tl();
            }
            None if self.position_tl >= duration => self.position_tl = 0,
            _ => {}
        }
        self.playing = true;
        true
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Advances the clock by `elapsed_tl` while playing.
    pub fn advance(&mut self, elapsed_tl: i64, active_range: Option<&ClipRange>) -> PlaybackUpdate {
        if !self.playing || elapsed_tl <= 0 {
            return PlaybackUpdate::Unchanged;
        }
        let Some(duration) = self.duration_tl else {
            self.playing = false;
            return PlaybackUpdate::Unchanged;
        };

        let next = self.position_tl.saturating_add(elapsed_tl);
        if let Some(range) = active_range.filter(|range| !range.contains(next)) {
            self.position_tl = range.start_tl();
            self.playing = false;
            return PlaybackUpdate::ReturnedToStart(self.position_tl);
        }
        if next >= duration {
            self.position_tl = duration;
            self.playing = false;
            return PlaybackUpdate::Ended(duration);
        }
        self.position_tl = next;
        PlaybackUpdate::Moved(next)
    }
}
