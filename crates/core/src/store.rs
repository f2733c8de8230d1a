use std::collections::BTreeMap;

use looper_transport::{AudioClip, ClipId, TrackId, TrackInfo};

/// Authoritative track and clip records.
///
/// Equality compares records only; the id allocators are not part of it.
#[derive(Debug, Clone, Default)]
pub struct ClipStore {
    tracks: BTreeMap<TrackId, TrackInfo>,
    clips: BTreeMap<ClipId, AudioClip>,
    next_track_id: u64,
    next_clip_id: u64,
}

impl PartialEq for ClipStore {
    fn eq(&self, other: &Self) -> bool {
        self.tracks == other.tracks && self.clips == other.clips
    }
}

impl ClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_track_id(&mut self) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        id
    }

    pub fn allocate_clip_id(&mut self) -> ClipId {
        let id = ClipId(self.next_clip_id);
        self.next_clip_id += 1;
        id
    }

    pub fn track(&self, id: TrackId) -> Option<&TrackInfo> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.values()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Insert or replace a track record.
    pub fn put_track(&mut self, track: TrackInfo) -> Option<TrackInfo> {
        self.next_track_id = self.next_track_id.max(track.id.0 + 1);
        self.tracks.insert(track.id, track)
    }

    /// Remove a track record. Its clips are left to the caller.
    pub fn remove_track(&mut self, id: TrackId) -> Option<TrackInfo> {
        self.tracks.remove(&id)
    }

    pub fn clip(&self, id: ClipId) -> Option<&AudioClip> {
        self.clips.get(&id)
    }

    pub fn clips(&self) -> impl Iterator<Item = &AudioClip> {
        self.clips.values()
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn clips_on_track(&self, track: TrackId) -> impl Iterator<Item = &AudioClip> {
        self.clips.values().filter(move |c| c.track_id == track)
    }

    /// Insert or replace a clip. Refused when its track is unknown.
    pub fn put_clip(&mut self, clip: AudioClip) -> bool {
        if !self.tracks.contains_key(&clip.track_id) {
            log::warn!("{} refers to unknown {}", clip.id, clip.track_id);
            return false;
        }
        self.next_clip_id = self.next_clip_id.max(clip.id.0 + 1);
        self.clips.insert(clip.id, clip);
        true
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<AudioClip> {
        self.clips.remove(&id)
    }

    /// Latest clip end in seconds, zero when empty.
    pub fn content_end(&self) -> f64 {
        self.clips.values().map(|c| c.end).fold(0.0, f64::max)
    }
}
