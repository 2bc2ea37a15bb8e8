// PlaybackController: the one owner of PlaybackState. Everything that changes
// what the player is doing goes through here; everyone else gets snapshots.
//
//   Idle -> Loading -> Ready -> Playing <-> Paused -> Stopped
//
// Seeking is a flag on top of Ready/Playing/Paused (and Stopped, which
// behaves like Ready parked at 0) while the interaction lock holds the
// mixer clock off.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::audio::SampleBuffer;
use crate::error::ControllerError;
use crate::grid::{BeatGrid, BeatGridCache, GridConfig, GridMap, TrackId};
use crate::loader::sample_loader::TrackSources;
use crate::mixer::{DecodedTrack, LayerState, LoadReport, MixerChannels, decode_sources};
use crate::scheduler::VoiceScheduler;
use crate::shared::{Layer, MAX_VOLUME, VoiceFilter};
use crate::tracker::{self, CurrentBeatInfo, LiveBeatTracker};

pub mod lock;
pub mod ticker;

use lock::InteractionLock;
use ticker::Ticker;

// how close to the end the clock has to be for a stopped engine to count as "finished"
const END_EPSILON: f64 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerConfig {
    pub grid: GridConfig,
    pub tick_interval: Duration,
    pub seek_cooldown: Duration,
    pub voice_filter: VoiceFilter,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            tick_interval: Duration::from_millis(25),
            seek_cooldown: Duration::from_millis(300),
            voice_filter: VoiceFilter::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Stopped,
}

impl PlayerState {
    pub fn label(self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading => "loading",
            PlayerState::Ready => "ready",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub track: Option<TrackId>,
    pub player: PlayerState,
    pub seeking: bool,
    pub current_time: f64,
    pub duration: f64,
    pub layers: BTreeMap<Layer, LayerState>,
    pub voice_filter: VoiceFilter,
    pub current_beat: Option<CurrentBeatInfo>,
    pub error: Option<String>,
}

impl PlaybackState {
    fn new(voice_filter: VoiceFilter) -> Self {
        Self {
            track: None,
            player: PlayerState::Idle,
            seeking: false,
            current_time: 0.0,
            duration: 0.0,
            layers: BTreeMap::new(),
            voice_filter,
            current_beat: None,
            error: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.player == PlayerState::Playing
    }
}

/// Identifies one `begin_load`. Completions carrying an older token are
/// dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadToken(u64);

struct PendingLoad {
    token: LoadToken,
    track: TrackId,
    map: GridMap,
}

pub struct PlaybackController {
    mixer: MixerChannels,
    state: PlaybackState,
    config: ControllerConfig,
    map: Option<GridMap>,
    grids: BeatGridCache,
    tracker: LiveBeatTracker,
    voice: VoiceScheduler,
    lock: InteractionLock,
    ticker: Option<Ticker>,
    load_generation: u64,
    pending: Option<PendingLoad>,
    subscribers: Vec<Sender<PlaybackState>>,
}

impl PlaybackController {
    pub fn new(mixer: MixerChannels, config: ControllerConfig) -> Self {
        let mut state = PlaybackState::new(config.voice_filter);
        state.layers = mixer.layers().collect();
        Self {
            mixer,
            state,
            config,
            map: None,
            grids: BeatGridCache::new(),
            tracker: LiveBeatTracker::new(),
            voice: VoiceScheduler::new(),
            lock: InteractionLock::new(config.seek_cooldown),
            ticker: None,
            load_generation: 0,
            pending: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn grid_map(&self) -> Option<&GridMap> {
        self.map.as_ref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    /// Every published state from now on, newest last.
    pub fn subscribe(&mut self) -> Receiver<PlaybackState> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let _ = tx.send(self.state.clone());
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self) {
        let snapshot = self.state.clone();
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    fn invalid(&self, op: &'static str) -> ControllerError {
        ControllerError::InvalidTransition { from: self.state.player.label(), op }
    }

    // -- loading --

    /// Start loading a track. Valid from any state; whatever was loading
    /// before is superseded.
    pub fn begin_load(&mut self, track: TrackId, map: GridMap) -> LoadToken {
        self.ticker = None;
        self.mixer.stop();
        if let Some(old) = self.state.track.take() {
            self.grids.invalidate(&old);
        }
        self.load_generation += 1;
        let token = LoadToken(self.load_generation);

        let mut state = PlaybackState::new(self.state.voice_filter);
        state.track = Some(track.clone());
        state.player = PlayerState::Loading;
        state.layers = self.mixer.layers().collect();
        self.state = state;
        self.map = None;
        self.tracker.reset();
        self.voice.reset();
        self.lock.release();
        self.pending = Some(PendingLoad { token, track, map });

        log::info!(target: "controller", "loading {} ({:?})", self.state.track.as_ref().map_or("", |t| t.0.as_str()), token);
        self.publish();
        token
    }

    pub fn complete_load(&mut self, token: LoadToken, decoded: DecodedTrack) -> Result<LoadReport, ControllerError> {
        let pending = match self.pending.take() {
            Some(p) if p.token == token => p,
            other => {
                self.pending = other;
                log::debug!(target: "controller", "ignoring stale load completion {:?}", token);
                return Err(ControllerError::StaleLoad);
            }
        };

        let report = match self.mixer.install(decoded) {
            Ok(report) => report,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e.into());
            }
        };
        for (layer, reason) in &report.failed {
            log::warn!(target: "controller", "{:?} layer unavailable: {reason}", layer);
        }

        let duration = if report.duration > 0.0 {
            report.duration
        } else {
            pending.map.duration().unwrap_or(0.0)
        };
        let grid = match self.grids.get_or_generate(&pending.track, &pending.map, duration, &self.config.grid) {
            Ok(grid) => grid,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e.into());
            }
        };

        self.map = Some(pending.map);
        self.state.duration = duration;
        self.state.current_time = 0.0;
        self.state.player = PlayerState::Ready;
        self.state.layers = self.mixer.layers().collect();
        self.state.current_beat = self.tracker.current(&grid, 0.0);
        self.state.error = None;
        log::info!(target: "controller", "ready: {:.2}s, {} beats", duration, grid.len());
        self.publish();
        Ok(report)
    }

    /// Decode on the spot and complete. The binary decodes on a worker
    /// instead and calls `begin_load`/`complete_load` itself.
    pub fn load_track(&mut self, track: TrackId, map: GridMap, sources: &TrackSources) -> Result<LoadReport, ControllerError> {
        let token = self.begin_load(track, map);
        let decoded = decode_sources(sources, self.mixer.sample_rate());
        self.complete_load(token, decoded)
    }

    pub fn load_counts(&mut self, samples: Vec<Arc<SampleBuffer>>) {
        self.mixer.load_counts(samples);
        self.state.layers = self.mixer.layers().collect();
        self.publish();
    }

    fn fail(&mut self, message: String) {
        log::warn!(target: "controller", "load failed: {message}");
        self.state.player = PlayerState::Idle;
        self.state.error = Some(message);
        self.state.current_beat = None;
        self.map = None;
        self.publish();
    }

    // -- transport --

    pub fn play(&mut self, now: Instant) -> Result<(), ControllerError> {
        match self.state.player {
            PlayerState::Ready | PlayerState::Paused | PlayerState::Stopped => {}
            _ => return Err(self.invalid("play")),
        }
        if self.map.is_none() {
            return Err(ControllerError::NoTrack);
        }
        self.mixer.play();
        self.state.player = PlayerState::Playing;
        self.ticker = Some(Ticker::start(now, self.config.tick_interval));
        self.publish();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ControllerError> {
        if self.state.player != PlayerState::Playing {
            return Err(self.invalid("pause"));
        }
        self.mixer.pause();
        self.ticker = None;
        self.state.player = PlayerState::Paused;
        self.publish();
        Ok(())
    }

    pub fn toggle_play(&mut self, now: Instant) -> Result<(), ControllerError> {
        if self.state.is_playing() { self.pause() } else { self.play(now) }
    }

    pub fn stop(&mut self) -> Result<(), ControllerError> {
        match self.state.player {
            PlayerState::Idle => return Err(self.invalid("stop")),
            PlayerState::Loading => {
                // the in-flight load is dead; its completion will be stale
                self.pending = None;
                self.load_generation += 1;
            }
            _ => {}
        }
        self.mixer.stop();
        self.ticker = None;
        self.lock.release();
        self.tracker.reset();
        self.voice.reset();
        self.state.player = PlayerState::Stopped;
        self.state.seeking = false;
        self.state.current_time = 0.0;
        self.state.current_beat = self.grid().and_then(|g| self.tracker.current(&g, 0.0));
        self.publish();
        Ok(())
    }

    /// Jump to `time` (clamped to the track). The visible position changes
    /// right away; the mixer clock is ignored until the cooldown runs out.
    pub fn seek(&mut self, time: f64, now: Instant) -> Result<(), ControllerError> {
        match self.state.player {
            PlayerState::Ready | PlayerState::Playing | PlayerState::Paused | PlayerState::Stopped => {}
            _ => return Err(self.invalid("seek")),
        }
        if self.map.is_none() {
            return Err(ControllerError::NoTrack);
        }
        let t = if time.is_finite() { time.clamp(0.0, self.state.duration) } else { 0.0 };
        self.mixer.seek(t);
        self.lock.engage(now);
        self.state.seeking = true;
        self.state.current_time = t;

        self.tracker.reset();
        let beat = self.grid().and_then(|g| self.tracker.current(&g, t));
        match beat {
            Some(b) if b.time < t => self.voice.settle(b.index),
            _ => self.voice.reset(),
        }
        self.state.current_beat = beat;
        log::debug!(target: "controller", "seek to {t:.3}s");
        self.publish();
        Ok(())
    }

    pub fn seek_by(&mut self, delta: f64, now: Instant) -> Result<(), ControllerError> {
        self.seek(self.state.current_time + delta, now)
    }

    pub fn step_forward(&mut self, now: Instant) -> Result<(), ControllerError> {
        self.step(now, tracker::step_forward)
    }

    pub fn step_back(&mut self, now: Instant) -> Result<(), ControllerError> {
        self.step(now, tracker::step_back)
    }

    fn step(
        &mut self,
        now: Instant,
        pick: fn(&BeatGrid, usize) -> Option<CurrentBeatInfo>,
    ) -> Result<(), ControllerError> {
        let grid = self.grid().ok_or(ControllerError::NoTrack)?;
        let index = self.state.current_beat.map_or(0, |b| b.index);
        let target = pick(&grid, index).ok_or(ControllerError::NoTrack)?;
        self.seek(target.time, now)
    }

    // -- mixer / policy --

    pub fn set_volume(&mut self, layer: Layer, volume: u8) {
        self.mixer.set_volume(layer, volume.min(MAX_VOLUME));
        self.state.layers = self.mixer.layers().collect();
        self.publish();
    }

    pub fn adjust_volume(&mut self, layer: Layer, delta: i16) {
        let current = self.mixer.layer(layer).volume as i16;
        self.set_volume(layer, (current + delta).clamp(0, MAX_VOLUME as i16) as u8);
    }

    pub fn set_enabled(&mut self, layer: Layer, enabled: bool) {
        self.mixer.set_enabled(layer, enabled);
        self.state.layers = self.mixer.layers().collect();
        self.publish();
    }

    pub fn toggle_layer(&mut self, layer: Layer) {
        let enabled = self.mixer.layer(layer).enabled;
        self.set_enabled(layer, !enabled);
    }

    pub fn set_voice_filter(&mut self, policy: VoiceFilter) {
        self.state.voice_filter = policy;
        self.publish();
    }

    // -- grid admin --

    pub fn replace_bridges(&mut self, payload: &serde_json::Value) -> Result<(), ControllerError> {
        let map = self.map.as_mut().ok_or(ControllerError::NoTrack)?;
        map.replace_bridges_json(payload)?;
        self.refresh_beat();
        Ok(())
    }

    pub fn set_offset(&mut self, offset: f64) -> Result<(), ControllerError> {
        let map = self.map.as_mut().ok_or(ControllerError::NoTrack)?;
        map.set_offset(offset)?;
        self.refresh_beat();
        Ok(())
    }

    fn refresh_beat(&mut self) {
        let t = self.state.current_time;
        self.state.current_beat = self.grid().and_then(|g| self.tracker.current(&g, t));
        self.publish();
    }

    // -- clock --

    // cache hit unless the map changed since the last call
    fn grid(&mut self) -> Option<Arc<BeatGrid>> {
        let (Some(track), Some(map)) = (self.state.track.as_ref(), self.map.as_ref()) else {
            return None;
        };
        match self.grids.get_or_generate(track, map, self.state.duration, &self.config.grid) {
            Ok(grid) => Some(grid),
            Err(e) => {
                log::warn!(target: "controller", "no beat grid: {e}");
                None
            }
        }
    }

    /// Drive the periodic task. Ends an expired seek cooldown whenever it is
    /// called; everything else waits for a due tick while playing. Returns
    /// the new beat when the beat changed.
    pub fn tick(&mut self, now: Instant) -> Option<CurrentBeatInfo> {
        let released = self.state.seeking && self.lock.accepts_mixer(now);
        if released {
            self.state.seeking = false;
        }

        let due = self.ticker.as_mut().is_some_and(|t| t.due(now));
        if !due {
            if released {
                self.publish();
            }
            return None;
        }

        if self.lock.accepts_mixer(now) {
            self.state.seeking = false;
            self.state.current_time = self.mixer.current_time().min(self.state.duration);
        }
        let t = self.state.current_time;

        let grid = self.grid();
        let info = grid.as_ref().and_then(|g| self.tracker.current(g, t));
        let changed = info.map(|b| b.index) != self.state.current_beat.map(|b| b.index);
        self.state.current_beat = info;

        if let (Some(grid), Some(info)) = (grid.as_ref(), info) {
            self.schedule_counts(grid, info, t);
        }

        if !self.state.seeking && t >= self.state.duration - END_EPSILON && !self.mixer.is_playing() {
            log::info!(target: "controller", "end of track");
            self.state.player = PlayerState::Paused;
            self.ticker = None;
        }

        self.publish();
        if changed { info } else { None }
    }

    // Speak the current beat if it was missed by less than a tick, and queue
    // the next one when it is close enough that the engine can start it on
    // its exact frame. A beat further behind (after a seek cooldown or a
    // stalled loop) goes by unspoken rather than landing off the beat.
    fn schedule_counts(&mut self, grid: &BeatGrid, info: CurrentBeatInfo, t: f64) {
        let policy = self.state.voice_filter;
        let tick = self.config.tick_interval.as_secs_f64();
        let lookahead = 2.0 * tick;

        if info.time <= t {
            if t - info.time > tick {
                self.voice.skip(info.index);
            } else if let Some(cue) = self.voice.on_beat(&info, policy) {
                self.mixer.trigger_count(cue.number, cue.at_time);
            }
        }
        let upcoming = if info.time > t {
            Some(info)
        } else {
            tracker::step_forward(grid, info.index).filter(|b| b.index != info.index)
        };
        if let Some(next) = upcoming {
            if next.time - t <= lookahead {
                if let Some(cue) = self.voice.on_beat(&next, policy) {
                    self.mixer.trigger_count(cue.number, cue.at_time);
                }
            }
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.ticker = None;
        self.mixer.stop();
    }
}
