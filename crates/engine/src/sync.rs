use std::collections::{BTreeMap, HashMap};

use looper_transport::{ClipId, EngineClip, TempoClock, TrackId};

use crate::element::MediaElement;
use crate::player::{MixState, PlayerClip, TrackPlayer};

/// Runtime per-clip override set by `Transport::mute_clip` and
/// `Transport::update_clip_gain`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClipOverride {
    pub muted: Option<bool>,
    pub gain: Option<f32>,
}

pub fn is_explicit_seek(previous: f64, current: f64, threshold: f64) -> bool {
    (current - previous).abs() > threshold
}

pub fn any_solo(clips: &[EngineClip]) -> bool {
    clips.iter().any(|c| c.solo)
}

/// Mute and gain for one clip. With any solo active, non-solo clips are
/// muted regardless of their own flag and solo clips ignore theirs. A
/// runtime override replaces the clip's own mute flag and gain.
pub fn resolve_mix(clip: &EngineClip, any_solo: bool, over: Option<&ClipOverride>) -> MixState {
    let override_muted = over.and_then(|o| o.muted);
    let muted = if any_solo {
        !clip.solo || override_muted == Some(true)
    } else {
        override_muted.unwrap_or(clip.muted)
    };
    let gain = over.and_then(|o| o.gain).unwrap_or(clip.gain);
    MixState { muted, gain }
}

/// Explicit-seek detection plus fan-out of clips and resyncs to players.
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    threshold: f64,
    last_reported: Option<f64>,
}

impl SyncCoordinator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_reported: None,
        }
    }

    /// Record a reported position and return whether it jumped far enough
    /// from the previous one to count as an explicit seek.
    pub fn observe(&mut self, reported: f64) -> bool {
        let jumped = self
            .last_reported
            .is_some_and(|previous| is_explicit_seek(previous, reported, self.threshold));
        self.last_reported = Some(reported);
        jumped
    }

    /// Forget history, optionally seeding it with a known position.
    pub fn reset(&mut self, position: Option<f64>) {
        self.last_reported = position;
    }

    pub fn last_reported(&self) -> Option<f64> {
        self.last_reported
    }

    /// Resolve mixes for every clip and hand each player its own.
    pub fn assign<E: MediaElement>(
        &self,
        players: &mut BTreeMap<TrackId, TrackPlayer<E>>,
        clips: &[EngineClip],
        overrides: &HashMap<ClipId, ClipOverride>,
        position: f64,
        clock: &TempoClock,
    ) {
        let solo = any_solo(clips);
        let mut per_track: BTreeMap<TrackId, Vec<PlayerClip>> = BTreeMap::new();
        for clip in clips {
            per_track.entry(clip.track_id).or_default().push(PlayerClip {
                mix: resolve_mix(clip, solo, overrides.get(&clip.clip_id)),
                clip: clip.clone(),
            });
        }

        for (track_id, player) in players.iter_mut() {
            let clips = per_track.remove(track_id).unwrap_or_default();
            player.set_clips(clips, position, clock);
        }
    }

    pub fn resync_all<E: MediaElement>(
        &self,
        players: &mut BTreeMap<TrackId, TrackPlayer<E>>,
        position: f64,
        clock: &TempoClock,
    ) {
        log::debug!("resyncing {} players to {position:.3}s", players.len());
        for player in players.values_mut() {
            player.resync(position, clock);
        }
    }
}
