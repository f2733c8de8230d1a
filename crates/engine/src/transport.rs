use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use looper_transport::{ClipId, DEFAULT_BPM, EngineClip, TempoClock, TrackId};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::element::SourceLoader;
use crate::error::EngineError;
use crate::player::{LoadState, TrackPlayer};
use crate::sync::{ClipOverride, SyncCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Playing,
    Paused,
    Disposed,
}

pub type TickCallback = Box<dyn FnMut(f64) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickSubscription(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub state: EngineState,
    pub bpm: f64,
    pub seconds_per_beat: f64,
    pub loop_length: f64,
    pub position: f64,
}

struct LoadOutcome<E> {
    track_id: TrackId,
    locator: String,
    generation: u64,
    result: anyhow::Result<E>,
}

/// The session loop engine: owns the tempo, the clip set, the loop window
/// and one `TrackPlayer` per track.
///
/// Position is advanced by `poll`, which the host (or
/// `SharedTransport::spawn_tick_loop`) calls on a steady cadence.
pub struct Transport<L: SourceLoader> {
    loader: Arc<L>,
    config: EngineConfig,
    state: EngineState,
    clock: TempoClock,
    clips: Vec<EngineClip>,
    min_bars: f64,
    loop_length: f64,
    position: f64,
    last_tick: Option<Instant>,
    pending_wrap: bool,
    players: BTreeMap<TrackId, TrackPlayer<L::Element>>,
    loads: JoinSet<LoadOutcome<L::Element>>,
    generation: u64,
    sync: SyncCoordinator,
    overrides: HashMap<ClipId, ClipOverride>,
    ticks: Vec<(TickSubscription, TickCallback)>,
    next_subscription: u64,
}

impl<L: SourceLoader> Transport<L> {
    pub fn new(loader: L, config: EngineConfig) -> Self {
        Self::with_loader(Arc::new(loader), config)
    }

    pub fn with_loader(loader: Arc<L>, config: EngineConfig) -> Self {
        let clock = TempoClock::new(DEFAULT_BPM);
        let min_bars = config.min_bars;
        let sync = SyncCoordinator::new(config.seek_threshold);
        let mut transport = Self {
            loader,
            config,
            state: EngineState::Uninitialized,
            clock,
            clips: Vec::new(),
            min_bars,
            loop_length: 0.0,
            position: 0.0,
            last_tick: None,
            pending_wrap: false,
            players: BTreeMap::new(),
            loads: JoinSet::new(),
            generation: 0,
            sync,
            overrides: HashMap::new(),
            ticks: Vec::new(),
            next_subscription: 0,
        };
        transport.loop_length = transport.compute_loop_length();
        transport
    }

    pub fn loader(&self) -> &Arc<L> {
        &self.loader
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    pub fn is_disposed(&self) -> bool {
        self.state == EngineState::Disposed
    }

    /// Bumped on dispose; work started under an older generation is stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clock(&self) -> &TempoClock {
        &self.clock
    }

    pub fn bpm(&self) -> f64 {
        self.clock.bpm()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn loop_length(&self) -> f64 {
        self.loop_length
    }

    pub fn clips(&self) -> &[EngineClip] {
        &self.clips
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            state: self.state,
            bpm: self.clock.bpm(),
            seconds_per_beat: self.clock.seconds_per_beat(),
            loop_length: self.loop_length,
            position: self.position,
        }
    }

    pub fn player(&self, track_id: TrackId) -> Option<&TrackPlayer<L::Element>> {
        self.players.get(&track_id)
    }

    pub fn load_state(&self, track_id: TrackId) -> Option<&LoadState> {
        self.players.get(&track_id).map(TrackPlayer::load_state)
    }

    /// Tracks whose source failed to load. Other tracks keep playing.
    pub fn load_errors(&self) -> Vec<EngineError> {
        self.players
            .values()
            .filter_map(|player| match player.load_state() {
                LoadState::Failed(reason) => Some(EngineError::Load {
                    track: player.track_id(),
                    locator: player.locator().to_string(),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Acquire the output backend. Repeat calls are no-ops; a failure
    /// leaves the transport uninitialized so it can be retried.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Ready | EngineState::Playing | EngineState::Paused => return Ok(()),
            EngineState::Uninitialized | EngineState::Initializing => {}
        }

        self.state = EngineState::Initializing;
        if let Err(source) = self.loader.prepare().await {
            self.state = EngineState::Uninitialized;
            log::warn!("transport initialize failed: {source:#}");
            return Err(EngineError::InitializeFailed { source });
        }
        self.state = EngineState::Ready;
        log::info!("transport ready");

        let pending: Vec<(TrackId, String)> = self
            .players
            .values()
            .filter(|p| p.load_state() == &LoadState::Loading && p.element().is_none())
            .map(|p| (p.track_id(), p.locator().to_string()))
            .collect();
        for (track_id, locator) in pending {
            self.spawn_load(track_id, locator);
        }
        Ok(())
    }

    /// Change tempo, keeping the musical position and playback state.
    pub fn set_bpm(&mut self, bpm: f64) {
        if self.is_disposed() {
            log::warn!("set_bpm on a disposed transport");
            return;
        }
        self.advance_clock();
        let beats = self.clock.seconds_to_beats(self.position);
        self.clock.set_bpm(bpm);
        self.loop_length = self.compute_loop_length();
        self.position = self.wrap(self.clock.beats_to_seconds(beats));
        self.sync.reset(Some(self.position));
        self.sync
            .resync_all(&mut self.players, self.position, &self.clock);
        log::info!(
            "tempo {:.2} bpm, loop {:.3}s",
            self.clock.bpm(),
            self.loop_length
        );
    }

    /// Replace the whole clip set. Only tracks whose source changed are
    /// reloaded; the position is kept modulo the new loop length.
    pub fn set_clips(&mut self, clips: Vec<EngineClip>, min_bars: f64) {
        if self.is_disposed() {
            log::warn!("set_clips on a disposed transport");
            return;
        }
        self.advance_clock();

        self.min_bars = if min_bars.is_finite() && min_bars > 0.0 {
            min_bars
        } else {
            log::warn!("invalid min bars {min_bars}, using {}", self.config.min_bars);
            self.config.min_bars
        };
        self.clips = clips;
        self.overrides
            .retain(|id, _| self.clips.iter().any(|c| c.clip_id == *id));
        self.loop_length = self.compute_loop_length();
        self.position = self.wrap(self.position);

        self.reconcile_players();
        self.sync.assign(
            &mut self.players,
            &self.clips,
            &self.overrides,
            self.position,
            &self.clock,
        );
        log::debug!(
            "{} clips on {} tracks, loop {:.3}s",
            self.clips.len(),
            self.players.len(),
            self.loop_length
        );
    }

    /// Start playback once every in-flight load has settled. Each player is
    /// aligned to the current position before it becomes audible.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Playing => return Ok(()),
            EngineState::Ready | EngineState::Paused => {}
            EngineState::Disposed => return Err(EngineError::Disposed),
            state => return Err(EngineError::NotReady(state)),
        }

        self.wait_for_loads().await;

        self.state = EngineState::Playing;
        self.last_tick = Some(Instant::now());
        self.sync.reset(None);
        for player in self.players.values_mut() {
            player.play(self.position, &self.clock);
        }
        log::info!("playing from {:.3}s", self.position);
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state != EngineState::Playing {
            return;
        }
        self.advance_clock();
        self.state = EngineState::Paused;
        self.last_tick = None;
        for player in self.players.values_mut() {
            player.stop();
        }
        log::info!("paused at {:.3}s", self.position);
    }

    pub fn seek(&mut self, seconds: f64) {
        if self.is_disposed() {
            log::warn!("seek on a disposed transport");
            return;
        }
        let target = if seconds.is_finite() {
            seconds
        } else {
            log::warn!("ignoring non-finite seek target, seeking to 0");
            0.0
        };
        self.position = self.wrap(target);
        if self.is_playing() {
            self.last_tick = Some(Instant::now());
        }
        self.sync.reset(Some(self.position));
        self.sync
            .resync_all(&mut self.players, self.position, &self.clock);
    }

    /// Feed the position the host is displaying. A jump beyond the seek
    /// threshold moves the transport there and hard-resyncs every player.
    pub fn report_position(&mut self, seconds: f64) -> bool {
        if self.is_disposed() || !seconds.is_finite() {
            return false;
        }
        if !self.sync.observe(seconds) {
            return false;
        }
        log::debug!("explicit seek to {seconds:.3}s");
        self.position = self.wrap(seconds);
        if self.is_playing() {
            self.last_tick = Some(Instant::now());
        }
        self.sync
            .resync_all(&mut self.players, self.position, &self.clock);
        true
    }

    pub fn mute_clip(&mut self, clip_id: ClipId, muted: bool) {
        if !self.has_clip(clip_id) {
            log::warn!("mute_clip: unknown {clip_id}");
            return;
        }
        self.overrides.entry(clip_id).or_default().muted = Some(muted);
        self.reassign();
    }

    pub fn update_clip_gain(&mut self, clip_id: ClipId, gain: f32) {
        if !self.has_clip(clip_id) {
            log::warn!("update_clip_gain: unknown {clip_id}");
            return;
        }
        let gain = if gain.is_finite() { gain.max(0.0) } else { 1.0 };
        self.overrides.entry(clip_id).or_default().gain = Some(gain);
        self.reassign();
    }

    pub fn on_tick(&mut self, callback: impl FnMut(f64) + Send + 'static) -> TickSubscription {
        let subscription = TickSubscription(self.next_subscription);
        self.next_subscription += 1;
        self.ticks.push((subscription, Box::new(callback)));
        subscription
    }

    pub fn remove_tick(&mut self, subscription: TickSubscription) -> bool {
        let before = self.ticks.len();
        self.ticks.retain(|(s, _)| *s != subscription);
        self.ticks.len() != before
    }

    /// Advance the position, apply finished loads, keep players aligned and
    /// notify tick subscribers. Returns the position while playing.
    pub fn poll(&mut self) -> Option<f64> {
        if self.is_disposed() {
            return None;
        }
        self.advance_clock();
        while let Some(joined) = self.loads.try_join_next() {
            self.apply_load(joined);
        }
        if !self.is_playing() {
            return None;
        }

        if std::mem::take(&mut self.pending_wrap) {
            log::debug!("loop wrapped");
            self.sync
                .resync_all(&mut self.players, self.position, &self.clock);
        } else {
            let epsilon = self.config.near_end_epsilon;
            for player in self.players.values_mut() {
                player.update(self.position, &self.clock, epsilon);
            }
        }

        for (_, callback) in self.ticks.iter_mut() {
            callback(self.position);
        }
        Some(self.position)
    }

    /// Wait for every in-flight source load and apply the results.
    pub async fn wait_for_loads(&mut self) {
        while let Some(joined) = self.loads.join_next().await {
            self.apply_load(joined);
        }
    }

    /// Release everything. Safe to call in any state; in-flight loads are
    /// aborted and anything they produce later is ignored.
    pub fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        let prepared = self.state != EngineState::Uninitialized;

        self.loads.abort_all();
        self.generation += 1;
        for player in self.players.values_mut() {
            player.stop();
        }
        self.players.clear();
        self.ticks.clear();
        self.overrides.clear();
        self.last_tick = None;
        self.state = EngineState::Disposed;

        if prepared {
            self.loader.release();
        }
        log::info!("transport disposed");
    }

    fn has_clip(&self, clip_id: ClipId) -> bool {
        self.clips.iter().any(|c| c.clip_id == clip_id)
    }

    fn reassign(&mut self) {
        self.sync.assign(
            &mut self.players,
            &self.clips,
            &self.overrides,
            self.position,
            &self.clock,
        );
    }

    fn accepts_loads(&self) -> bool {
        matches!(
            self.state,
            EngineState::Ready | EngineState::Playing | EngineState::Paused
        )
    }

    fn compute_loop_length(&self) -> f64 {
        let floor = self.clock.bars_to_seconds(self.min_bars);
        self.clips
            .iter()
            .map(|c| c.end_seconds(&self.clock))
            .filter(|end| end.is_finite())
            .fold(floor, f64::max)
    }

    fn wrap(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() || self.loop_length <= 0.0 {
            return 0.0;
        }
        let wrapped = seconds.rem_euclid(self.loop_length);
        if wrapped >= self.loop_length { 0.0 } else { wrapped }
    }

    fn advance_clock(&mut self) {
        if !self.is_playing() {
            return;
        }
        let now = Instant::now();
        let Some(last) = self.last_tick.replace(now) else {
            return;
        };
        let next = self.position + now.duration_since(last).as_secs_f64();
        if next >= self.loop_length {
            self.pending_wrap = true;
        }
        self.position = self.wrap(next);
    }

    fn reconcile_players(&mut self) {
        let mut wanted: BTreeMap<TrackId, String> = BTreeMap::new();
        for clip in &self.clips {
            wanted
                .entry(clip.track_id)
                .or_insert_with(|| clip.source_url.clone());
        }

        let stale: Vec<TrackId> = self
            .players
            .iter()
            .filter(|&(id, player)| wanted.get(id).is_none_or(|url| url != player.locator()))
            .map(|(id, _)| *id)
            .collect();
        for track_id in stale {
            if let Some(mut player) = self.players.remove(&track_id) {
                player.stop();
                let locator = player.locator().to_string();
                drop(player);
                log::debug!("{track_id} removed ({locator})");
                if !wanted.values().any(|url| *url == locator) {
                    self.loader.forget(&locator);
                }
            }
        }

        for (track_id, locator) in wanted {
            if self.players.contains_key(&track_id) {
                continue;
            }
            self.players
                .insert(track_id, TrackPlayer::new(track_id, locator.clone()));
            if self.accepts_loads() {
                self.spawn_load(track_id, locator);
            }
        }
    }

    fn spawn_load(&mut self, track_id: TrackId, locator: String) {
        log::debug!("loading {locator} for {track_id}");
        let load = self.loader.load(locator.clone());
        let generation = self.generation;
        self.loads.spawn(async move {
            LoadOutcome {
                track_id,
                locator,
                generation,
                result: load.await,
            }
        });
    }

    fn apply_load(&mut self, joined: Result<LoadOutcome<L::Element>, JoinError>) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                log::warn!("load task failed: {e}");
                return;
            }
        };
        if outcome.generation != self.generation {
            log::debug!("discarding load of {} from a disposed session", outcome.locator);
            return;
        }
        if self.is_playing() {
            self.advance_clock();
        }

        let Some(player) = self
            .players
            .get_mut(&outcome.track_id)
            .filter(|p| p.locator() == outcome.locator && p.element().is_none())
        else {
            log::debug!("discarding stale load of {}", outcome.locator);
            return;
        };

        match outcome.result {
            Ok(element) => {
                log::info!("{} loaded {}", outcome.track_id, outcome.locator);
                player.attach(element);
                if self.state == EngineState::Playing {
                    player.play(self.position, &self.clock);
                }
            }
            Err(e) => {
                log::warn!(
                    "{} failed to load {}: {e:#}",
                    outcome.track_id,
                    outcome.locator
                );
                player.fail(format!("{e:#}"));
            }
        }
    }
}
