// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Shared session handle.
//!
//! Commands and clock ticks take the same lock on the controller, so they
//! never interleave. Observers receive immutable snapshots over a
//! broadcast channel; engine commands leave through an unbounded queue
//! after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::controller::{MasterController, PositionDelta, TickReport};
use crate::engine::{spawn_engine_dispatcher, AudioEngine, EngineCommand};
use crate::error::{Result, SyncError};
use crate::preset::{MultiSongPreset, PresetStore, RestoreOutcome, SongCatalogue};
use crate::state::{MultiSongState, PlaybackMode, SongId, SongTransportState};
use crate::timing::{PositionClock, SyncMode};

/// Observer channel capacity
const EVENT_CAPACITY: usize = 256;

/// Notifications pushed to observers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A command changed the state
    StateChanged(Arc<MultiSongState>),
    /// Sent on every clock tick with the position movement, which is empty
    /// while nothing plays
    Tick(Arc<Vec<PositionDelta>>),
    /// Non-fatal problem raised by a command
    Warning(SyncError),
}

#[derive(Clone)]
struct EngineLink {
    engine: Arc<dyn AudioEngine>,
    commands: mpsc::UnboundedSender<EngineCommand>,
}

/// Cloneable handle to one live session
#[derive(Clone)]
pub struct Session {
    controller: Arc<Mutex<MasterController>>,
    event_tx: broadcast::Sender<SessionEvent>,
    engine: Option<EngineLink>,
}

impl Session {
    /// Wrap a controller with no audio engine attached
    pub fn new(controller: MasterController) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            controller: Arc::new(Mutex::new(controller)),
            event_tx,
            engine: None,
        }
    }

    /// Wrap a controller and forward its commands to `engine`.
    ///
    /// Must be called inside a tokio runtime; the returned task ends once
    /// every clone of the session is dropped.
    pub fn with_engine(mut controller: MasterController, engine: Arc<dyn AudioEngine>) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let dispatcher = spawn_engine_dispatcher(engine.clone(), command_rx);

        controller.sync_engine();
        let initial = controller.take_engine_commands();

        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let session = Self {
            controller: Arc::new(Mutex::new(controller)),
            event_tx,
            engine: Some(EngineLink {
                engine,
                commands: command_tx,
            }),
        };
        session.dispatch(initial);
        (session, dispatcher)
    }

    /// Subscribe to observer events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> MultiSongState {
        self.lock().snapshot()
    }

    pub fn play(&self) -> Result<()> {
        self.command("play", |c| c.play())
    }

    pub fn pause(&self) -> Result<()> {
        self.command("pause", |c| c.pause())
    }

    pub fn stop(&self) -> Result<()> {
        self.command("stop", |c| c.stop())
    }

    pub fn seek(&self, song: &SongId, position: f64) -> Result<()> {
        self.command("seek", |c| c.seek(song, position))
    }

    pub fn set_master_tempo(&self, tempo: f64) -> Result<()> {
        self.command("set_master_tempo", |c| c.set_master_tempo(tempo))
    }

    pub fn set_master_volume(&self, volume: f64) -> Result<()> {
        self.command("set_master_volume", |c| c.set_master_volume(volume))
    }

    pub fn set_sync_mode(&self, mode: SyncMode) -> Result<()> {
        self.command("set_sync_mode", |c| c.set_sync_mode(mode))
    }

    pub fn set_playback_mode(&self, mode: PlaybackMode) -> Result<()> {
        self.command("set_playback_mode", |c| c.set_playback_mode(mode))
    }

    pub fn add_song(&self, song: SongTransportState) -> Result<()> {
        self.command("add_song", |c| c.add_song(song))
    }

    pub fn remove_song(&self, song: &SongId) -> Result<()> {
        self.command("remove_song", |c| c.remove_song(song))
    }

    pub fn set_loop(&self, song: &SongId, start: f64, end: f64, enabled: bool) -> Result<()> {
        self.command("set_loop", |c| c.set_loop(song, start, end, enabled))
    }

    pub fn set_mute(&self, song: &SongId, muted: bool) -> Result<()> {
        self.command("set_mute", |c| c.set_mute(song, muted))
    }

    pub fn set_solo(&self, song: &SongId, solo: bool) -> Result<()> {
        self.command("set_solo", |c| c.set_solo(song, solo))
    }

    pub fn set_volume(&self, song: &SongId, volume: f64) -> Result<()> {
        self.command("set_volume", |c| c.set_volume(song, volume))
    }

    /// Register a tap; returns the new master tempo once known
    pub fn tap_tempo(&self) -> Result<Option<f64>> {
        let now = Instant::now();
        self.command("tap_tempo", |c| c.tap_tempo(now))
    }

    /// Apply reloaded runtime settings; song state is untouched
    pub fn apply_config(&self, config: &SessionConfig) {
        self.lock().apply_options(config.controller_options());
        info!("session config applied");
    }

    /// Advance playback by `delta_seconds` and notify observers
    pub fn tick(&self, delta_seconds: f64) -> TickReport {
        let (report, commands, snapshot) = {
            let mut controller = self.lock();
            let engine = self.engine.as_ref().map(|link| link.engine.as_ref());
            let report = controller.tick(delta_seconds, engine);
            let commands = controller.take_engine_commands();
            let snapshot = report.state_changed.then(|| Arc::new(controller.snapshot()));
            (report, commands, snapshot)
        };
        trace!(delta_seconds, songs = report.deltas.len(), "tick");

        self.dispatch(commands);
        self.broadcast(SessionEvent::Tick(Arc::new(report.deltas.clone())));
        if let Some(snapshot) = snapshot {
            self.broadcast(SessionEvent::StateChanged(snapshot));
        }
        report
    }

    /// Drive `tick` from a fixed-rate timer until the task is aborted
    pub fn spawn_clock(&self, mut clock: PositionClock) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(clock.tick_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            clock.start(Instant::now());
            debug!(rate_hz = clock.tick_rate_hz(), "position clock started");
            loop {
                interval.tick().await;
                if let Some(delta) = clock.tick(Instant::now()) {
                    session.tick(delta);
                }
            }
        })
    }

    /// Capture the current state and hand it to `store` under `name`
    pub fn save_preset(&self, name: &str, store: &dyn PresetStore) -> Result<MultiSongPreset> {
        let preset = MultiSongPreset::capture(&self.snapshot(), name)?;
        store.put(name, preset.to_json()?.into_bytes())?;
        info!(preset = name, songs = preset.songs.len(), "preset saved");
        Ok(preset)
    }

    /// Replace the live state with a stored preset
    pub fn load_preset(
        &self,
        name: &str,
        store: &dyn PresetStore,
        catalogue: &dyn SongCatalogue,
    ) -> Result<RestoreOutcome> {
        let bytes = store.get(name)?;
        let json = String::from_utf8(bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
        let outcome = MultiSongPreset::from_json(&json)?.restore(catalogue)?;

        let (commands, snapshot, warnings) = {
            let mut controller = self.lock();
            let mut replacement = MasterController::from_state(outcome.state.clone(), controller.options().clone())?;

            let mut commands = controller.take_engine_commands();
            for old in controller.snapshot().songs {
                if outcome.state.song(&old.id).is_none() {
                    commands.push(EngineCommand::SetPlaying {
                        song: old.id,
                        playing: false,
                    });
                }
            }
            commands.extend(replacement.take_engine_commands());

            let mut warnings = outcome.warnings.clone();
            warnings.extend(replacement.warnings().iter().cloned());
            let snapshot = Arc::new(replacement.snapshot());
            *controller = replacement;
            (commands, snapshot, warnings)
        };

        self.dispatch(commands);
        for warning in warnings {
            self.broadcast(SessionEvent::Warning(warning));
        }
        self.broadcast(SessionEvent::StateChanged(snapshot));
        info!(preset = name, dropped = outcome.dropped.len(), "preset loaded");
        Ok(outcome)
    }

    /// Run one command under the lock, then publish its effects
    fn command<T>(&self, name: &str, f: impl FnOnce(&mut MasterController) -> Result<T>) -> Result<T> {
        let (value, commands, snapshot, warnings) = {
            let mut controller = self.lock();
            let value = f(&mut *controller).map_err(|e| {
                debug!(command = name, error = %e, "command rejected");
                e
            })?;
            let commands = controller.take_engine_commands();
            let snapshot = Arc::new(controller.snapshot());
            let warnings = controller.warnings().to_vec();
            (value, commands, snapshot, warnings)
        };

        self.dispatch(commands);
        for warning in warnings {
            warn!(command = name, warning = %warning, "command completed with warning");
            self.broadcast(SessionEvent::Warning(warning));
        }
        self.broadcast(SessionEvent::StateChanged(snapshot));
        Ok(value)
    }

    fn dispatch(&self, commands: Vec<EngineCommand>) {
        let Some(link) = self.engine.as_ref() else {
            return;
        };
        for command in commands {
            if link.commands.send(command).is_err() {
                debug!("engine dispatcher gone, dropping commands");
                return;
            }
        }
    }

    fn broadcast(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, MasterController> {
        // Every command leaves the controller consistent, so a panic in
        // another holder does not invalidate it
        self.controller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
