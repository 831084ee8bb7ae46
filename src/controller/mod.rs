// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Master controller.
//!
//! The single owner of the live multi-song state. Every operator command
//! is validated here before anything is mutated; a rejected command
//! leaves the state exactly as it was. Engine-facing side effects are
//! queued in an outbox and drained by the session after the command.

pub mod playback;

pub use playback::{Candidate, PendingStart, PlaybackScheduler};

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{AudioEngine, EngineCommand};
use crate::error::{Result, SyncError};
use crate::state::{MasterState, MultiSongState, PlayState, PlaybackMode, PresetExtras, SongId, SongTransportState};
use crate::sync::{BaselineTempoTable, Smoothing, SyncCoordinator};
use crate::timing::{is_valid_volume, PositionSource, SyncMode, TapTempo};
use crate::transport::{is_audible, AdvanceOutcome, Transport};

/// Runtime policy knobs for the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    /// Tempo smoothing
    pub smoothing: Smoothing,
    /// Delay between consecutive starts in cascade mode
    pub cascade_stagger_secs: f64,
    /// Seed for random playback mode
    pub random_seed: Option<u64>,
    /// Position policy for playing songs
    pub position_source: PositionSource,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::default(),
            cascade_stagger_secs: 4.0,
            random_seed: None,
            position_source: PositionSource::Integrate,
        }
    }
}

/// Position movement of one song during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct PositionDelta {
    pub song: SongId,
    /// Position before the tick
    pub previous: f64,
    /// Position after the tick
    pub position: f64,
    /// Position wrapped at the loop end
    pub wrapped: bool,
}

/// Outcome of one clock tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// One entry per song that was playing
    pub deltas: Vec<PositionDelta>,
    /// Play states changed (songs finished or started, master stopped)
    pub state_changed: bool,
}

/// Single entry point for operator commands
#[derive(Debug)]
pub struct MasterController {
    /// Session id
    id: Uuid,
    /// Transports, sync mode and baselines
    coordinator: SyncCoordinator,
    /// Master volume (0.0 - 1.0)
    master_volume: f64,
    /// Master transport state
    play_state: PlayState,
    /// Which songs start on play
    playback_mode: PlaybackMode,
    /// Playback-mode bookkeeping
    scheduler: PlaybackScheduler,
    /// Runtime options
    options: ControllerOptions,
    /// Tap tempo calculator
    tap_tempo: TapTempo,
    /// Non-fatal warnings raised by the last command
    warnings: Vec<SyncError>,
    /// Commands waiting for the audio engine
    outbox: Vec<EngineCommand>,
    /// Unknown fields from the preset this session was loaded from
    preset_extras: PresetExtras,
}

impl MasterController {
    /// Create an empty controller
    pub fn new(master: &MasterState, options: ControllerOptions) -> Result<Self> {
        if !is_valid_volume(master.master_volume) {
            return Err(SyncError::InvalidParameter(format!(
                "master volume {}",
                master.master_volume
            )));
        }
        let mut coordinator = SyncCoordinator::new(master.master_tempo, options.smoothing)?;
        let warnings = coordinator.set_sync_mode(master.sync_mode);
        Ok(Self {
            id: Uuid::new_v4(),
            coordinator,
            master_volume: master.master_volume,
            play_state: PlayState::Stopped,
            playback_mode: master.playback_mode,
            scheduler: PlaybackScheduler::new(options.random_seed),
            options,
            tap_tempo: TapTempo::default(),
            warnings,
            outbox: Vec::new(),
            preset_extras: PresetExtras::default(),
        })
    }

    /// Rebuild a controller from a restored state
    pub fn from_state(state: MultiSongState, options: ControllerOptions) -> Result<Self> {
        let MultiSongState {
            id,
            songs,
            master,
            baseline_tempos,
            ratio_reference_tempo,
            mut preset_extras,
            ..
        } = state;

        if !is_valid_volume(master.master_volume) {
            return Err(SyncError::InvalidParameter(format!(
                "master volume {}",
                master.master_volume
            )));
        }

        let mut seen = HashSet::new();
        let mut transports = Vec::with_capacity(songs.len());
        for song in songs {
            if !seen.insert(song.id.clone()) {
                return Err(SyncError::DuplicateSongId(song.id));
            }
            transports.push(Transport::new(song)?);
        }

        let baselines = (master.sync_mode == SyncMode::Ratio).then(|| {
            BaselineTempoTable::from_parts(
                ratio_reference_tempo.unwrap_or(master.master_tempo),
                baseline_tempos,
            )
        });
        let (coordinator, warnings) = SyncCoordinator::restore(
            transports,
            master.sync_mode,
            master.master_tempo,
            baselines,
            options.smoothing,
        )?;

        let mut controller = Self {
            id,
            coordinator,
            master_volume: master.master_volume,
            play_state: master.play_state,
            playback_mode: master.playback_mode,
            scheduler: PlaybackScheduler::new(options.random_seed),
            options,
            tap_tempo: TapTempo::default(),
            warnings,
            outbox: Vec::new(),
            preset_extras: PresetExtras::default(),
        };
        preset_extras
            .songs
            .retain(|id, _| controller.coordinator.transport(id).is_ok());
        controller.preset_extras = preset_extras;
        controller.sync_engine();
        info!(session = %controller.id, songs = controller.coordinator.transports().len(), "session restored");
        Ok(controller)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Unknown preset fields carried by this session
    pub fn preset_extras(&self) -> &PresetExtras {
        &self.preset_extras
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    pub fn playback_mode(&self) -> PlaybackMode {
        self.playback_mode
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.coordinator.mode()
    }

    pub fn master_tempo(&self) -> f64 {
        self.coordinator.master_tempo()
    }

    pub fn master_volume(&self) -> f64 {
        self.master_volume
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Warnings raised by the most recent command
    pub fn warnings(&self) -> &[SyncError] {
        &self.warnings
    }

    /// Look up one song's state
    pub fn song(&self, id: &SongId) -> Result<&SongTransportState> {
        Ok(self.coordinator.transport(id)?.state())
    }

    /// Replace runtime options; song state is untouched
    pub fn apply_options(&mut self, options: ControllerOptions) {
        self.coordinator.set_smoothing(options.smoothing);
        if options.random_seed != self.options.random_seed {
            self.scheduler.reseed(options.random_seed);
        }
        self.options = options;
        debug!("controller options updated");
    }

    /// Start playback according to the playback mode, or resume from pause
    pub fn play(&mut self) -> Result<()> {
        self.warnings.clear();
        match self.play_state {
            PlayState::Playing => {}
            PlayState::Paused => {
                for transport in self.coordinator.transports_mut() {
                    if transport.play_state() == PlayState::Paused {
                        transport.play();
                        self.outbox.push(EngineCommand::SetPlaying {
                            song: transport.id().clone(),
                            playing: true,
                        });
                    }
                }
                self.play_state = PlayState::Playing;
                info!("resumed");
            }
            PlayState::Stopped => {
                let candidates = self.candidates();
                let started = self.scheduler.start(
                    self.playback_mode,
                    &candidates,
                    self.options.cascade_stagger_secs,
                );
                if started.is_empty() && !self.scheduler.has_pending() {
                    debug!("play requested but no song is eligible");
                    return Ok(());
                }
                for id in &started {
                    self.start_song(id);
                }
                self.play_state = PlayState::Playing;
                info!(mode = ?self.playback_mode, started = started.len(), "playing");
            }
        }
        Ok(())
    }

    /// Pause every playing song, keeping positions
    pub fn pause(&mut self) -> Result<()> {
        self.warnings.clear();
        if self.play_state != PlayState::Playing {
            return Ok(());
        }
        for transport in self.coordinator.transports_mut() {
            if transport.is_playing() {
                transport.pause();
                self.outbox.push(EngineCommand::SetPlaying {
                    song: transport.id().clone(),
                    playing: false,
                });
            }
        }
        self.play_state = PlayState::Paused;
        info!("paused");
        Ok(())
    }

    /// Halt every song and cancel tempo transitions. Positions are kept.
    pub fn stop(&mut self) -> Result<()> {
        self.warnings.clear();
        for transport in self.coordinator.transports_mut() {
            if transport.play_state() != PlayState::Stopped {
                transport.stop();
                self.outbox.push(EngineCommand::SetPlaying {
                    song: transport.id().clone(),
                    playing: false,
                });
            }
        }
        self.scheduler.clear();
        self.coordinator.cancel_transitions();
        self.flush_tempo_changes();
        self.play_state = PlayState::Stopped;
        info!("stopped");
        Ok(())
    }

    /// Move one song's position
    pub fn seek(&mut self, id: &SongId, position: f64) -> Result<()> {
        self.warnings.clear();
        let position = self.coordinator.transport_mut(id)?.seek(position)?;
        self.outbox.push(EngineCommand::Seek {
            song: id.clone(),
            position,
        });
        Ok(())
    }

    /// Change the master tempo
    pub fn set_master_tempo(&mut self, tempo: f64) -> Result<()> {
        self.warnings.clear();
        self.warnings = self.coordinator.set_master_tempo(tempo)?;
        self.flush_tempo_changes();
        debug!(tempo, "master tempo set");
        Ok(())
    }

    /// Change the master volume
    pub fn set_master_volume(&mut self, volume: f64) -> Result<()> {
        self.warnings.clear();
        if !is_valid_volume(volume) {
            return Err(SyncError::InvalidParameter(format!("master volume {}", volume)));
        }
        self.master_volume = volume;
        self.push_all_volumes();
        Ok(())
    }

    /// Change the sync mode
    pub fn set_sync_mode(&mut self, mode: SyncMode) -> Result<()> {
        self.warnings = self.coordinator.set_sync_mode(mode);
        self.flush_tempo_changes();
        Ok(())
    }

    /// Change the playback mode; takes effect on the next start
    pub fn set_playback_mode(&mut self, mode: PlaybackMode) -> Result<()> {
        self.warnings.clear();
        if mode != self.playback_mode {
            info!(from = ?self.playback_mode, to = ?mode, "playback mode change");
            self.playback_mode = mode;
        }
        Ok(())
    }

    /// Add a song at the end of the playback order
    pub fn add_song(&mut self, song: SongTransportState) -> Result<()> {
        self.warnings.clear();
        self.warnings = self.coordinator.add_song(song)?;
        if let Some(transport) = self.coordinator.transports().last() {
            self.outbox.push(EngineCommand::Seek {
                song: transport.id().clone(),
                position: transport.position(),
            });
        }
        self.flush_tempo_changes();
        self.push_all_volumes();
        Ok(())
    }

    /// Remove a song
    pub fn remove_song(&mut self, id: &SongId) -> Result<()> {
        self.warnings.clear();
        self.coordinator.remove_song(id)?;
        self.scheduler.forget(id);
        self.preset_extras.songs.remove(id);
        self.outbox.retain(|command| command.song() != id);
        self.outbox.push(EngineCommand::SetPlaying {
            song: id.clone(),
            playing: false,
        });
        self.push_all_volumes();
        Ok(())
    }

    /// Configure one song's loop region
    pub fn set_loop(&mut self, id: &SongId, start: f64, end: f64, enabled: bool) -> Result<()> {
        self.warnings.clear();
        let transport = self.coordinator.transport_mut(id)?;
        transport.set_loop(start, end, enabled)?;
        let position = transport.position();
        self.outbox.push(EngineCommand::Seek {
            song: id.clone(),
            position,
        });
        Ok(())
    }

    /// Mute or unmute a song
    pub fn set_mute(&mut self, id: &SongId, muted: bool) -> Result<()> {
        self.warnings.clear();
        self.coordinator.transport_mut(id)?.set_muted(muted);
        self.push_all_volumes();
        Ok(())
    }

    /// Solo or unsolo a song
    pub fn set_solo(&mut self, id: &SongId, solo: bool) -> Result<()> {
        self.warnings.clear();
        self.coordinator.transport_mut(id)?.set_solo(solo);
        self.push_all_volumes();
        Ok(())
    }

    /// Change one song's volume
    pub fn set_volume(&mut self, id: &SongId, volume: f64) -> Result<()> {
        self.warnings.clear();
        self.coordinator.transport_mut(id)?.set_volume(volume)?;
        self.push_volume(id);
        Ok(())
    }

    /// Register a tap; once the tempo is known it becomes the master tempo
    pub fn tap_tempo(&mut self, now: Instant) -> Result<Option<f64>> {
        match self.tap_tempo.tap(now) {
            Some(bpm) => {
                self.set_master_tempo(bpm)?;
                Ok(Some(bpm))
            }
            None => {
                self.warnings.clear();
                Ok(None)
            }
        }
    }

    /// Advance playback by `delta_seconds` of wall-clock time.
    ///
    /// With `PositionSource::Engine` and an engine present, playing songs
    /// take the engine's last reported position instead of integrating.
    pub fn tick(&mut self, delta_seconds: f64, engine: Option<&dyn AudioEngine>) -> TickReport {
        let mut report = TickReport::default();
        self.coordinator.advance_transitions(delta_seconds);

        if self.play_state != PlayState::Playing {
            self.flush_tempo_changes();
            return report;
        }

        let poll = match (self.options.position_source, engine) {
            (PositionSource::Engine, Some(engine)) => Some(engine),
            _ => None,
        };

        let mut finished = Vec::new();
        for transport in self.coordinator.transports_mut() {
            if !transport.is_playing() {
                continue;
            }
            let previous = transport.position();
            let outcome = match poll.and_then(|engine| engine.poll_position(transport.id())) {
                Some(position) => transport.reconcile(position),
                None => transport.advance(delta_seconds),
            };
            report.deltas.push(PositionDelta {
                song: transport.id().clone(),
                previous,
                position: transport.position(),
                wrapped: outcome == AdvanceOutcome::Wrapped,
            });
            if outcome == AdvanceOutcome::Finished {
                finished.push(transport.id().clone());
            }
        }

        for id in finished {
            report.state_changed = true;
            self.outbox.push(EngineCommand::SetPlaying {
                song: id.clone(),
                playing: false,
            });
            let candidates = self.candidates();
            if let Some(next) = self.scheduler.on_finished(self.playback_mode, &id, &candidates) {
                debug!(finished = %id, next = %next, "advancing to next song");
                self.start_song(&next);
            }
        }

        for id in self.scheduler.advance(delta_seconds) {
            if self.coordinator.is_audible(&id).unwrap_or(false) {
                report.state_changed |= self.start_song(&id);
            }
        }

        let any_playing = self.coordinator.transports().iter().any(|t| t.is_playing());
        if !any_playing && !self.scheduler.has_pending() {
            self.play_state = PlayState::Stopped;
            report.state_changed = true;
            info!("all songs finished");
        }

        self.flush_tempo_changes();
        report
    }

    /// Immutable copy of the full state
    pub fn snapshot(&self) -> MultiSongState {
        let baselines = self.coordinator.baselines();
        MultiSongState {
            id: self.id,
            songs: self
                .coordinator
                .transports()
                .iter()
                .map(|t| t.state().clone())
                .collect(),
            master: MasterState {
                master_tempo: self.coordinator.master_tempo(),
                master_volume: self.master_volume,
                play_state: self.play_state,
                playback_mode: self.playback_mode,
                sync_mode: self.coordinator.mode(),
            },
            baseline_tempos: baselines
                .map(|table| table.baselines().clone())
                .unwrap_or_else(BTreeMap::new),
            ratio_reference_tempo: baselines.map(|table| table.reference_tempo()),
            tempo_ratios: self.coordinator.tempo_ratios().clone(),
            preset_extras: self.preset_extras.clone(),
        }
    }

    /// Drain commands waiting for the audio engine
    pub fn take_engine_commands(&mut self) -> Vec<EngineCommand> {
        self.flush_tempo_changes();
        std::mem::take(&mut self.outbox)
    }

    /// Queue the full per-song state for the engine
    pub fn sync_engine(&mut self) {
        self.coordinator.take_tempo_changes();
        for transport in self.coordinator.transports() {
            let song = transport.id().clone();
            self.outbox.push(EngineCommand::SetTempo {
                song: song.clone(),
                tempo: transport.effective_tempo(),
            });
            self.outbox.push(EngineCommand::Seek {
                song: song.clone(),
                position: transport.position(),
            });
            self.outbox.push(EngineCommand::SetPlaying {
                song,
                playing: transport.is_playing(),
            });
        }
        self.push_all_volumes();
    }

    fn candidates(&self) -> Vec<Candidate> {
        let any_solo = self.coordinator.any_solo();
        self.coordinator
            .transports()
            .iter()
            .map(|t| Candidate::new(t.id().clone(), is_audible(t.state(), any_solo)))
            .collect()
    }

    fn start_song(&mut self, id: &SongId) -> bool {
        let Ok(transport) = self.coordinator.transport_mut(id) else {
            return false;
        };
        transport.play();
        let position = transport.position();
        self.outbox.push(EngineCommand::Seek {
            song: id.clone(),
            position,
        });
        self.outbox.push(EngineCommand::SetPlaying {
            song: id.clone(),
            playing: true,
        });
        true
    }

    fn engine_volume(&self, song: &SongTransportState, any_solo: bool) -> f64 {
        if is_audible(song, any_solo) {
            song.volume * self.master_volume
        } else {
            0.0
        }
    }

    fn push_volume(&mut self, id: &SongId) {
        let any_solo = self.coordinator.any_solo();
        if let Ok(transport) = self.coordinator.transport(id) {
            let volume = self.engine_volume(transport.state(), any_solo);
            self.outbox.push(EngineCommand::SetVolume {
                song: id.clone(),
                volume,
            });
        }
    }

    fn push_all_volumes(&mut self) {
        let any_solo = self.coordinator.any_solo();
        let volumes: Vec<EngineCommand> = self
            .coordinator
            .transports()
            .iter()
            .map(|t| EngineCommand::SetVolume {
                song: t.id().clone(),
                volume: self.engine_volume(t.state(), any_solo),
            })
            .collect();
        self.outbox.extend(volumes);
    }

    fn flush_tempo_changes(&mut self) {
        for (song, tempo) in self.coordinator.take_tempo_changes() {
            self.outbox.push(EngineCommand::SetTempo { song, tempo });
        }
    }
}
