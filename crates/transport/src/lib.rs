//! Shared timing and arrangement records for the looper crates.
//!
//! Everything here is plain data plus pure conversions: no I/O and no audio.

pub mod model;
pub mod time;

pub use model::{
    AudioClip, ClipId, ClipInput, ClipPlacement, DEFAULT_BARS, EngineClip, MIN_CLIP_BEATS,
    MIN_CLIP_SECONDS, SourceTrim, TimingSource, TrackId, TrackInfo, TrackTiming, min_clip_seconds,
    resolve_track_timing,
};
pub use time::{
    DEFAULT_BPM, MAX_BPM, MIN_BPM, MusicalPosition, PPQN, TempoClock, TimeSignature, sanitize_bpm,
};
