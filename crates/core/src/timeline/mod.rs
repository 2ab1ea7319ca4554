use std::time::Duration;

/// Cached transport clock of the loaded item.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    position: Duration,
    duration: Option<Duration>,
}

impl PlaybackClock {
    pub fn new(position: Duration, duration: Option<Duration>) -> Self {
        Self { position, duration }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn update(&mut self, position: Option<Duration>, duration: Option<Duration>) {
        if let Some(position) = position {
            self.position = position;
        }
        self.duration = duration;
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    /// Known, non-zero length of the item.
    pub fn duration(&self) -> Option<Duration> {
        self.duration.filter(|duration| !duration.is_zero())
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        self.duration()
            .map(|duration| duration.saturating_sub(self.position))
    }

    /// `position / duration` in `[0, 1]`, or `None` while the duration is
    /// unknown.
    pub fn progress(&self) -> Option<f32> {
        normalized_progress(self.position, self.duration)
    }

    pub fn time_for_progress(&self, progress: f32) -> Duration {
        time_for_progress(progress, self.duration)
    }
}

/// Divides position by duration, refusing an unknown or empty duration.
pub fn normalized_progress(position: Duration, duration: Option<Duration>) -> Option<f32> {
    let duration = duration.filter(|duration| !duration.is_zero())?;
    let progress = position.as_secs_f64() / duration.as_secs_f64();
    progress.is_finite().then(|| progress.clamp(0.0, 1.0) as f32)
}

/// Maps a normalized progress to an offset from the start of the item.
///
/// Out-of-range values are clamped and NaN reads as the start, so the
/// mapping is monotonic over `[0, 1]`. An unknown duration maps everything
/// to the start.
pub fn time_for_progress(progress: f32, duration: Option<Duration>) -> Duration {
    let Some(duration) = duration else {
        return Duration::ZERO;
    };
    if progress.is_nan() {
        return Duration::ZERO;
    }

    duration.mul_f64(f64::from(progress.clamp(0.0, 1.0)))
}
