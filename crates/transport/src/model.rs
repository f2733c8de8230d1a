use serde::{Deserialize, Serialize};

use crate::time::TempoClock;

/// Bar count used when a track has neither explicit bars nor a known duration,
/// and the default minimum loop window.
pub const DEFAULT_BARS: f64 = 8.0;
/// Shortest clip, in beats.
pub const MIN_CLIP_BEATS: f64 = 0.25;
/// Shortest clip in seconds, regardless of tempo.
pub const MIN_CLIP_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u64);

impl ClipId {
    const DERIVED_BIT: u64 = 1 << 63;

    /// Id of the single clip derived from a track that has no explicit clips.
    pub fn derived(track: TrackId) -> Self {
        Self(track.0 | Self::DERIVED_BIT)
    }

    pub fn is_derived(&self) -> bool {
        self.0 & Self::DERIVED_BIT != 0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

fn unity_gain() -> f32 {
    1.0
}

/// Track metadata as supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    #[serde(default)]
    pub name: String,
    pub source_url: String,
    /// Length of the source in seconds, once analyzed.
    #[serde(default)]
    pub nominal_duration: Option<f64>,
    /// Explicit loop length of the source in bars.
    #[serde(default)]
    pub bars: Option<f64>,
    #[serde(default = "unity_gain")]
    pub gain: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
}

impl TrackInfo {
    pub fn new(id: TrackId, source_url: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            source_url: source_url.into(),
            nominal_duration: None,
            bars: None,
            gain: 1.0,
            muted: false,
            solo: false,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.nominal_duration = Some(seconds);
        self
    }

    pub fn with_bars(mut self, bars: f64) -> Self {
        self.bars = Some(bars);
        self
    }
}

/// Where a track's resolved length came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    ExplicitBars,
    NominalDuration,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackTiming {
    pub bars: f64,
    pub duration_beats: f64,
    pub duration_seconds: f64,
    pub source: TimingSource,
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Resolve the musical length of a track.
///
/// Precedence: explicit `bars`, then `nominal_duration` converted at the
/// clock's tempo, then [`DEFAULT_BARS`]. Non-positive or non-finite values
/// are treated as absent.
pub fn resolve_track_timing(track: &TrackInfo, clock: &TempoClock) -> TrackTiming {
    if let Some(bars) = positive(track.bars) {
        let duration_beats = clock.bars_to_beats(bars);
        return TrackTiming {
            bars,
            duration_beats,
            duration_seconds: clock.beats_to_seconds(duration_beats),
            source: TimingSource::ExplicitBars,
        };
    }

    if let Some(seconds) = positive(track.nominal_duration) {
        let duration_beats = clock.seconds_to_beats(seconds);
        return TrackTiming {
            bars: duration_beats / clock.beats_per_bar(),
            duration_beats,
            duration_seconds: seconds,
            source: TimingSource::NominalDuration,
        };
    }

    let duration_beats = clock.bars_to_beats(DEFAULT_BARS);
    TrackTiming {
        bars: DEFAULT_BARS,
        duration_beats,
        duration_seconds: clock.beats_to_seconds(duration_beats),
        source: TimingSource::Default,
    }
}

/// The window of the source file a clip plays, in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceTrim {
    pub offset: f64,
    pub duration: f64,
}

impl SourceTrim {
    pub fn full(duration: f64) -> Self {
        Self {
            offset: 0.0,
            duration: duration.max(0.0),
        }
    }

    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }

    /// Clamp the window into `[0, total]` when the total source length is known.
    pub fn clamped(self, total: Option<f64>) -> Self {
        let offset = if self.offset.is_finite() { self.offset.max(0.0) } else { 0.0 };
        let duration = if self.duration.is_finite() { self.duration.max(0.0) } else { 0.0 };
        match positive(total) {
            Some(total) => {
                let offset = offset.min(total);
                Self {
                    offset,
                    duration: duration.min(total - offset),
                }
            }
            None => Self { offset, duration },
        }
    }
}

/// A clip's position on the timeline, in either unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClipPlacement {
    Seconds { start: f64, end: f64 },
    Beats { offset: f64, duration: f64 },
}

impl ClipPlacement {
    /// Resolve to `(start, end)` seconds, enforcing the minimum clip length.
    pub fn to_seconds(&self, clock: &TempoClock) -> (f64, f64) {
        let (start, end) = match *self {
            ClipPlacement::Seconds { start, end } => (start, end),
            ClipPlacement::Beats { offset, duration } => {
                let start = clock.beats_to_seconds(offset);
                (start, start + clock.beats_to_seconds(duration))
            }
        };
        let start = if start.is_finite() { start.max(0.0) } else { 0.0 };
        let end = if end.is_finite() { end } else { start };
        (start, start + (end - start).max(min_clip_seconds(clock)))
    }
}

/// Minimum clip length in seconds at the given tempo.
pub fn min_clip_seconds(clock: &TempoClock) -> f64 {
    clock.beats_to_seconds(MIN_CLIP_BEATS).max(MIN_CLIP_SECONDS)
}

/// A placed, time-bounded reference to a window of a track's source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub id: ClipId,
    pub track_id: TrackId,
    /// Timeline start in seconds.
    pub start: f64,
    /// Timeline end in seconds, always greater than `start`.
    pub end: f64,
    pub trim: SourceTrim,
    /// Full length of the source file, when known.
    pub source_total: Option<f64>,
    pub gain: f32,
    pub muted: bool,
}

impl AudioClip {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, seconds: f64) -> bool {
        seconds >= self.start && seconds < self.end
    }
}

/// Explicit clip input from the host: timeline seconds plus a trim window
/// given as `[source_trim_start, source_trim_end)` positions in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInput {
    pub track_id: TrackId,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub source_trim_start: f64,
    #[serde(default)]
    pub source_trim_end: Option<f64>,
    #[serde(default)]
    pub full_source_duration: Option<f64>,
}

impl ClipInput {
    pub fn resolve(&self, id: ClipId, clock: &TempoClock) -> AudioClip {
        let (start, end) = ClipPlacement::Seconds {
            start: self.start_time,
            end: self.end_time,
        }
        .to_seconds(clock);
        let trim_end = self.source_trim_end.unwrap_or(self.source_trim_start + (end - start));
        let trim = SourceTrim {
            offset: self.source_trim_start,
            duration: trim_end - self.source_trim_start,
        }
        .clamped(self.full_source_duration);

        AudioClip {
            id,
            track_id: self.track_id,
            start,
            end,
            trim,
            source_total: positive(self.full_source_duration),
            gain: 1.0,
            muted: false,
        }
    }
}

/// The engine's beat-based view of one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineClip {
    pub clip_id: ClipId,
    pub track_id: TrackId,
    pub source_url: String,
    pub offset_beats: f64,
    pub duration_beats: f64,
    /// Source window; `None` plays the source from its start.
    pub trim: Option<SourceTrim>,
    pub gain: f32,
    pub muted: bool,
    pub solo: bool,
}

impl EngineClip {
    pub fn end_beats(&self) -> f64 {
        self.offset_beats + self.duration_beats
    }

    pub fn start_seconds(&self, clock: &TempoClock) -> f64 {
        clock.beats_to_seconds(self.offset_beats)
    }

    pub fn end_seconds(&self, clock: &TempoClock) -> f64 {
        clock.beats_to_seconds(self.end_beats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_bar_track_is_sixteen_beats() {
        let clock = TempoClock::new(120.0);
        let track = TrackInfo::new(TrackId(1), "drums.wav").with_bars(4.0);
        let timing = resolve_track_timing(&track, &clock);
        assert_eq!(timing.duration_beats, 16.0);
        assert_eq!(timing.duration_seconds, 8.0);
        assert_eq!(timing.source, TimingSource::ExplicitBars);
    }

    #[test]
    fn test_timing_from_nominal_duration() {
        let clock = TempoClock::new(100.0);
        let track = TrackInfo::new(TrackId(1), "pad.wav").with_duration(10.0);
        let timing = resolve_track_timing(&track, &clock);
        assert!((timing.duration_beats - 16.6667).abs() < 1e-3);
        assert_eq!(timing.duration_seconds, 10.0);
        assert_eq!(timing.source, TimingSource::NominalDuration);
    }

    #[test]
    fn test_bars_take_precedence_over_duration() {
        let clock = TempoClock::new(120.0);
        let track = TrackInfo::new(TrackId(1), "a.wav")
            .with_duration(3.0)
            .with_bars(2.0);
        assert_eq!(resolve_track_timing(&track, &clock).duration_beats, 8.0);
    }

    #[test]
    fn test_unknown_length_falls_back_to_default_bars() {
        let clock = TempoClock::new(120.0);
        let mut track = TrackInfo::new(TrackId(1), "a.wav").with_duration(-2.0);
        track.bars = Some(f64::NAN);
        let timing = resolve_track_timing(&track, &clock);
        assert_eq!(timing.bars, DEFAULT_BARS);
        assert_eq!(timing.duration_seconds, 16.0);
        assert_eq!(timing.source, TimingSource::Default);
    }

    #[test]
    fn test_trim_clamped_to_source() {
        let trim = SourceTrim { offset: 8.0, duration: 5.0 }.clamped(Some(10.0));
        assert_eq!(trim, SourceTrim { offset: 8.0, duration: 2.0 });

        let trim = SourceTrim { offset: -1.0, duration: 3.0 }.clamped(Some(10.0));
        assert_eq!(trim.offset, 0.0);

        let trim = SourceTrim { offset: 12.0, duration: 1.0 }.clamped(Some(10.0));
        assert_eq!(trim, SourceTrim { offset: 10.0, duration: 0.0 });
    }

    #[test]
    fn test_placement_enforces_minimum_length() {
        let clock = TempoClock::new(120.0);
        let (start, end) = ClipPlacement::Seconds { start: 2.0, end: 1.0 }.to_seconds(&clock);
        assert_eq!(start, 2.0);
        assert_eq!(end, 2.125);

        let (start, end) = ClipPlacement::Beats { offset: 4.0, duration: 4.0 }.to_seconds(&clock);
        assert_eq!((start, end), (2.0, 4.0));
    }

    #[test]
    fn test_clip_input_resolves_trim_window() {
        let clock = TempoClock::new(120.0);
        let input = ClipInput {
            track_id: TrackId(3),
            start_time: 4.0,
            end_time: 6.0,
            source_trim_start: 1.0,
            source_trim_end: Some(3.0),
            full_source_duration: Some(2.5),
        };
        let clip = input.resolve(ClipId(9), &clock);
        assert_eq!(clip.start, 4.0);
        assert_eq!(clip.end, 6.0);
        assert_eq!(clip.trim, SourceTrim { offset: 1.0, duration: 1.5 });
        assert_eq!(clip.source_total, Some(2.5));
    }

    #[test]
    fn test_track_info_from_json_defaults() {
        let track: TrackInfo =
            serde_json::from_str(r#"{"id": 4, "source_url": "loops/bass.ogg"}"#).expect("parse");
        assert_eq!(track.id, TrackId(4));
        assert_eq!(track.gain, 1.0);
        assert!(!track.muted);
        assert_eq!(track.nominal_duration, None);
    }

    #[test]
    fn test_derived_clip_ids_do_not_collide() {
        let derived = ClipId::derived(TrackId(7));
        assert!(derived.is_derived());
        assert_ne!(derived, ClipId(7));
        assert!(!ClipId(7).is_derived());
    }
}
