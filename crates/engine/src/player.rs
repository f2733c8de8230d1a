use looper_transport::{ClipId, EngineClip, TempoClock, TrackId};

use crate::element::MediaElement;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// Resolved audibility of one clip after mute/solo/override resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixState {
    pub muted: bool,
    pub gain: f32,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            muted: false,
            gain: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerClip {
    pub clip: EngineClip,
    pub mix: MixState,
}

/// Where a track's element belongs at some transport position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cue {
    pub clip_id: ClipId,
    /// Source seconds, before folding into the element's duration.
    pub source_position: f64,
    /// Source window the clip plays, `(start, end)`; open-ended without a trim.
    pub window: (f64, Option<f64>),
    pub mix: MixState,
}

/// Pick the clip covering `position` and map the position into the source.
///
/// When clips overlap the one starting latest wins. A derived clip stands
/// for the whole track: it covers everything from its start on and repeats
/// every `duration_beats`.
pub fn cue_at(clips: &[PlayerClip], position: f64, clock: &TempoClock) -> Option<Cue> {
    clips
        .iter()
        .filter(|pc| covers(&pc.clip, position, clock))
        .max_by(|a, b| a.clip.offset_beats.total_cmp(&b.clip.offset_beats))
        .map(|pc| {
            let local = position - pc.clip.start_seconds(clock);
            let (source_position, window) = match pc.clip.trim {
                Some(trim) if trim.duration > 0.0 => (
                    trim.offset + local % trim.duration,
                    (trim.offset, Some(trim.end())),
                ),
                Some(trim) => (trim.offset, (trim.offset, Some(trim.offset))),
                None if is_repeating(&pc.clip) => {
                    let period = clock.beats_to_seconds(pc.clip.duration_beats);
                    (local % period, (0.0, Some(period)))
                }
                None => (local, (0.0, None)),
            };
            Cue {
                clip_id: pc.clip.clip_id,
                source_position,
                window,
                mix: pc.mix,
            }
        })
}

fn is_repeating(clip: &EngineClip) -> bool {
    clip.trim.is_none() && clip.clip_id.is_derived() && clip.duration_beats > 0.0
}

fn covers(clip: &EngineClip, position: f64, clock: &TempoClock) -> bool {
    let start = clip.start_seconds(clock);
    position >= start && (is_repeating(clip) || position < clip.end_seconds(clock))
}

/// Fold a source position into an element of `duration` seconds.
fn fit_to_element(position: f64, duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d > 0.0 => position % d,
        _ => position,
    }
}

/// Keeps one track's media element aligned with the transport.
pub struct TrackPlayer<E> {
    track_id: TrackId,
    locator: String,
    element: Option<E>,
    load_state: LoadState,
    clips: Vec<PlayerClip>,
    cue: Option<Cue>,
    playing: bool,
    force_muted: bool,
    last_element_time: Option<f64>,
}

impl<E: MediaElement> TrackPlayer<E> {
    pub fn new(track_id: TrackId, locator: impl Into<String>) -> Self {
        Self {
            track_id,
            locator: locator.into(),
            element: None,
            load_state: LoadState::Loading,
            clips: Vec::new(),
            cue: None,
            playing: false,
            force_muted: true,
            last_element_time: None,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn element(&self) -> Option<&E> {
        self.element.as_ref()
    }

    pub fn clips(&self) -> &[PlayerClip] {
        &self.clips
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn active_clip(&self) -> Option<ClipId> {
        self.cue.map(|cue| cue.clip_id)
    }

    /// Take ownership of the loaded element. It starts paused and muted.
    pub fn attach(&mut self, mut element: E) {
        element.pause();
        element.set_muted(true);
        self.element = Some(element);
        self.load_state = LoadState::Ready;
        self.last_element_time = None;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.element = None;
        self.load_state = LoadState::Failed(reason.into());
    }

    /// Replace this track's clips. A playing player hard-seeks only when the
    /// active clip changed; otherwise just the mix is reapplied.
    pub fn set_clips(&mut self, clips: Vec<PlayerClip>, position: f64, clock: &TempoClock) {
        self.clips = clips;
        if !self.playing {
            return;
        }
        let cue = cue_at(&self.clips, position, clock);
        if cue.map(|c| c.clip_id) != self.active_clip() {
            self.resync(position, clock);
        } else {
            self.cue = cue;
            self.apply_output();
        }
    }

    /// Align and start. Mute and gain are applied before the element starts.
    pub fn play(&mut self, position: f64, clock: &TempoClock) {
        self.playing = true;
        self.force_muted = false;
        self.resync(position, clock);
    }

    /// Pause, rewind to zero and stay muted until the next `play`.
    pub fn stop(&mut self) {
        self.playing = false;
        self.force_muted = true;
        self.cue = None;
        self.last_element_time = None;
        if let Some(element) = self.element.as_mut() {
            element.pause();
            element.set_current_time(0.0);
            element.set_muted(true);
        }
    }

    /// Hard-seek the element to where `position` maps.
    pub fn resync(&mut self, position: f64, clock: &TempoClock) {
        self.cue = cue_at(&self.clips, position, clock);
        if !self.playing {
            return;
        }
        let cue = self.cue;
        let Some(element) = self.element.as_mut() else {
            return;
        };

        match cue {
            Some(cue) => {
                let target = fit_to_element(cue.source_position, element.duration());
                element.set_current_time(target);
                self.last_element_time = Some(target);
                self.apply_output();
                if let Some(element) = self.element.as_mut()
                    && element.is_paused()
                {
                    element.play();
                }
                log::debug!(
                    "{} resynced to {target:.3}s ({})",
                    self.track_id,
                    cue.clip_id
                );
            }
            None => {
                element.set_muted(true);
                element.pause();
                self.last_element_time = None;
            }
        }
    }

    /// Per-tick maintenance while playing: clip gating and end-of-window
    /// handling. Small drift against the transport is left alone.
    pub fn update(&mut self, position: f64, clock: &TempoClock, near_end_epsilon: f64) {
        if !self.playing || self.element.is_none() {
            return;
        }

        let cue = cue_at(&self.clips, position, clock);
        if cue.map(|c| c.clip_id) != self.active_clip() {
            log::debug!("{} crossed a clip boundary at {position:.3}s", self.track_id);
            self.resync(position, clock);
            return;
        }
        let Some(cue) = cue else {
            return;
        };
        let track_id = self.track_id;
        let Some(element) = self.element.as_mut() else {
            return;
        };

        let mut time = element.current_time();
        if let Some(last) = self.last_element_time
            && time + 1e-3 < last
        {
            log::debug!("{track_id} element wrapped {last:.3}s -> {time:.3}s");
        }

        let (window_start, window_end) = cue.window;
        if let Some(end) = window_end.or(element.duration())
            && end - window_start > near_end_epsilon
            && end - time < near_end_epsilon
        {
            element.set_current_time(window_start);
            time = window_start;
        }
        self.last_element_time = Some(time);
    }

    fn apply_output(&mut self) {
        let muted = self.force_muted || self.cue.is_none_or(|cue| cue.mix.muted);
        let gain = self.cue.map_or(0.0, |cue| cue.mix.gain);
        if let Some(element) = self.element.as_mut() {
            element.set_volume(gain);
            element.set_muted(muted);
        }
    }
}
