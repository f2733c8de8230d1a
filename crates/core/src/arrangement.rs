//! Conversion from the editor's seconds-based records to the engine's
//! beat-based clip list.

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use looper_transport::{
    AudioClip, ClipId, EngineClip, TempoClock, TrackId, TrackInfo, resolve_track_timing,
};

/// Build the engine clip list.
///
/// Tracks with explicit clips contribute those clips; a track with none
/// plays its whole source once from the top, as a derived clip spanning its
/// resolved length. Clips whose track is unknown are skipped. Output is
/// ordered by track, then by start.
pub fn compute_engine_clips<'a>(
    tracks: impl IntoIterator<Item = &'a TrackInfo>,
    clips: impl IntoIterator<Item = &'a AudioClip>,
    clock: &TempoClock,
) -> Vec<EngineClip> {
    let tracks: BTreeMap<TrackId, &TrackInfo> = tracks.into_iter().map(|t| (t.id, t)).collect();

    let mut by_track: BTreeMap<TrackId, Vec<&AudioClip>> = BTreeMap::new();
    for clip in clips {
        if tracks.contains_key(&clip.track_id) {
            by_track.entry(clip.track_id).or_default().push(clip);
        } else {
            log::warn!("{} refers to unknown {}, skipped", clip.id, clip.track_id);
        }
    }

    let mut out = Vec::new();
    for (id, track) in &tracks {
        match by_track.get_mut(id) {
            Some(clips) => {
                clips.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.id.cmp(&b.id)));
                out.extend(clips.iter().map(|clip| explicit_clip(track, clip, clock)));
            }
            None => out.push(derived_clip(track, clock)),
        }
    }
    out
}

fn explicit_clip(track: &TrackInfo, clip: &AudioClip, clock: &TempoClock) -> EngineClip {
    EngineClip {
        clip_id: clip.id,
        track_id: track.id,
        source_url: track.source_url.clone(),
        offset_beats: clock.seconds_to_beats(clip.start),
        duration_beats: clock.seconds_to_beats(clip.duration()),
        trim: Some(clip.trim),
        gain: track.gain * clip.gain,
        muted: track.muted || clip.muted,
        solo: track.solo,
    }
}

fn derived_clip(track: &TrackInfo, clock: &TempoClock) -> EngineClip {
    let timing = resolve_track_timing(track, clock);
    EngineClip {
        clip_id: ClipId::derived(track.id),
        track_id: track.id,
        source_url: track.source_url.clone(),
        offset_beats: 0.0,
        duration_beats: timing.duration_beats,
        trim: None,
        gain: track.gain,
        muted: track.muted,
        solo: track.solo,
    }
}

/// Content hash of an engine clip list. Equal lists hash equal, so a host
/// can skip `set_clips` when nothing the engine sees has changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipSignature(u64);

impl ClipSignature {
    pub fn of(clips: &[EngineClip]) -> Self {
        let mut hasher = DefaultHasher::new();
        clips.len().hash(&mut hasher);
        for clip in clips {
            clip.clip_id.hash(&mut hasher);
            clip.track_id.hash(&mut hasher);
            clip.source_url.hash(&mut hasher);
            clip.offset_beats.to_bits().hash(&mut hasher);
            clip.duration_beats.to_bits().hash(&mut hasher);
            match clip.trim {
                Some(trim) => {
                    1u8.hash(&mut hasher);
                    trim.offset.to_bits().hash(&mut hasher);
                    trim.duration.to_bits().hash(&mut hasher);
                }
                None => 0u8.hash(&mut hasher),
            }
            clip.gain.to_bits().hash(&mut hasher);
            clip.muted.hash(&mut hasher);
            clip.solo.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}
