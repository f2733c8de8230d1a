use serde::{Deserialize, Serialize};

/// Ticks per beat used for bar.beat.tick display.
pub const PPQN: u64 = 960;

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator: numerator.max(1),
            denominator: denominator.max(1),
        }
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.numerator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<(u32, u32)> for TimeSignature {
    fn from((numerator, denominator): (u32, u32)) -> Self {
        Self::new(numerator, denominator)
    }
}

/// Clamp a tempo into the supported range. Non-finite or non-positive input
/// falls back to the default so later divisions never produce NaN/Infinity.
pub fn sanitize_bpm(bpm: f64) -> f64 {
    if !bpm.is_finite() || bpm <= 0.0 {
        log::warn!("invalid bpm {bpm}, falling back to {DEFAULT_BPM}");
        return DEFAULT_BPM;
    }
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Pure bpm <-> seconds <-> beats conversions for one tempo.
///
/// The clock is `Copy` and carries no state besides the tempo and meter, so
/// every component can hold its own instance and rebuild it on tempo change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoClock {
    bpm: f64,
    time_signature: TimeSignature,
}

impl TempoClock {
    pub fn new(bpm: f64) -> Self {
        Self::with_signature(bpm, TimeSignature::default())
    }

    pub fn with_signature(bpm: f64, time_signature: impl Into<TimeSignature>) -> Self {
        Self {
            bpm: sanitize_bpm(bpm),
            time_signature: time_signature.into(),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = sanitize_bpm(bpm);
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn beats_per_bar(&self) -> f64 {
        self.time_signature.beats_per_bar() as f64
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn seconds_per_bar(&self) -> f64 {
        self.seconds_per_beat() * self.beats_per_bar()
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat()
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds / self.seconds_per_beat()
    }

    pub fn bars_to_seconds(&self, bars: f64) -> f64 {
        bars * self.seconds_per_bar()
    }

    pub fn bars_to_beats(&self, bars: f64) -> f64 {
        bars * self.beats_per_bar()
    }

    /// Quantize a time in seconds to the nearest beat boundary.
    pub fn snap_to_grid(&self, seconds: f64) -> f64 {
        self.snap_to_grid_with(seconds, 1.0)
    }

    /// Quantize to a grid of `division` beats (0.25 = sixteenth notes in 4/4).
    pub fn snap_to_grid_with(&self, seconds: f64, division: f64) -> f64 {
        if !seconds.is_finite() {
            return 0.0;
        }
        if division <= 0.0 || !division.is_finite() {
            return seconds;
        }
        let step = self.seconds_per_beat() * division;
        (seconds / step).round() * step
    }

    pub fn format_position(&self, seconds: f64) -> MusicalPosition {
        let seconds = seconds.max(0.0);
        let total_beats = self.seconds_to_beats(seconds);
        let beats_per_bar = self.beats_per_bar();

        let bar = (total_beats / beats_per_bar).floor() as u32 + 1;
        let beat = (total_beats % beats_per_bar).floor() as u32 + 1;
        let tick = (total_beats.fract() * PPQN as f64).floor() as u32;

        MusicalPosition { bar, beat, tick }
    }
}

impl Default for TempoClock {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32,
    pub tick: u32,
}

impl std::fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{:03}", self.bar, self.beat, self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_per_beat_at_120() {
        let clock = TempoClock::new(120.0);
        assert_eq!(clock.seconds_per_beat(), 0.5);
        assert_eq!(clock.seconds_per_bar(), 2.0);
        assert_eq!(clock.bars_to_beats(4.0), 16.0);
    }

    #[test]
    fn test_seconds_per_beat_matches_formula() {
        for bpm in [1.0, 60.0, 90.5, 100.0, 174.0, 999.0] {
            let clock = TempoClock::new(bpm);
            assert!((clock.seconds_per_beat() - 60.0 / bpm).abs() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_bpm_is_clamped() {
        assert_eq!(TempoClock::new(0.0).bpm(), DEFAULT_BPM);
        assert_eq!(TempoClock::new(-40.0).bpm(), DEFAULT_BPM);
        assert_eq!(TempoClock::new(f64::NAN).bpm(), DEFAULT_BPM);
        assert_eq!(TempoClock::new(5000.0).bpm(), MAX_BPM);
        assert!(TempoClock::new(0.0).seconds_per_beat().is_finite());
    }

    #[test]
    fn test_snap_to_grid() {
        let clock = TempoClock::new(120.0);
        assert_eq!(clock.snap_to_grid(1.2), 1.0);
        assert_eq!(clock.snap_to_grid(1.3), 1.5);
        assert_eq!(clock.snap_to_grid(0.0), 0.0);
    }

    #[test]
    fn test_snap_to_grid_is_idempotent() {
        for bpm in [97.0, 100.0, 120.0, 133.3] {
            let clock = TempoClock::new(bpm);
            for i in 0..200 {
                let t = i as f64 * 0.137;
                let once = clock.snap_to_grid(t);
                assert_eq!(clock.snap_to_grid(once), once, "bpm {bpm}, t {t}");
            }
        }
    }

    #[test]
    fn test_snap_to_sub_beat_grid() {
        let clock = TempoClock::new(120.0);
        assert_eq!(clock.snap_to_grid_with(0.3, 0.25), 0.25);
        assert_eq!(clock.snap_to_grid_with(0.3, 0.0), 0.3);
    }

    #[test]
    fn test_format_position() {
        let clock = TempoClock::new(120.0);
        assert_eq!(clock.format_position(0.0).to_string(), "1.1.000");
        // 2.25s = 4.5 beats = bar 2, beat 1, half a beat
        assert_eq!(clock.format_position(2.25).to_string(), "2.1.480");
    }
}
