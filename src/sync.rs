// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Sync coordinator.
//!
//! Owns every song transport together with the sync mode, the master tempo
//! and the ratio-mode baseline table, and keeps each transport's effective
//! tempo consistent with them. Smoothed tempo changes are carried here as
//! transitions and resolved from clock ticks.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::state::{SongId, SongTransportState};
use crate::timing::{
    compute_effective_tempo, is_valid_tempo, tempo_ratio, RatioBasis, SyncMode, TempoTransition,
    TransitionCurve,
};
use crate::transport::{is_audible, Transport};

/// Tempo smoothing settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothing {
    /// Interpolate tempo changes instead of stepping
    pub enabled: bool,
    /// Transition length in seconds
    pub duration_secs: f64,
    /// Interpolation curve
    pub curve: TransitionCurve,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_secs: 0.5,
            curve: TransitionCurve::Linear,
        }
    }
}

/// Song tempos captured on entering ratio mode
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineTempoTable {
    /// Master tempo at the moment ratio mode was entered
    reference_tempo: f64,
    /// Per-song baseline tempo
    baselines: BTreeMap<SongId, f64>,
}

impl BaselineTempoTable {
    /// Create an empty table anchored at `reference_tempo`
    pub fn new(reference_tempo: f64) -> Self {
        Self {
            reference_tempo,
            baselines: BTreeMap::new(),
        }
    }

    /// Build a table from stored values
    pub fn from_parts(reference_tempo: f64, baselines: BTreeMap<SongId, f64>) -> Self {
        Self {
            reference_tempo,
            baselines,
        }
    }

    pub fn reference_tempo(&self) -> f64 {
        self.reference_tempo
    }

    pub fn baseline(&self, id: &SongId) -> Option<f64> {
        self.baselines.get(id).copied()
    }

    pub fn baselines(&self) -> &BTreeMap<SongId, f64> {
        &self.baselines
    }

    pub fn insert(&mut self, id: SongId, tempo: f64) {
        self.baselines.insert(id, tempo);
    }

    pub fn remove(&mut self, id: &SongId) {
        self.baselines.remove(id);
    }

    /// Ratio basis for a song, if it has an entry
    pub fn basis(&self, id: &SongId) -> Option<RatioBasis> {
        self.baseline(id)
            .map(|baseline| RatioBasis::new(baseline, self.reference_tempo))
    }
}

/// Keeps song tempos consistent with the sync mode and master tempo
#[derive(Debug)]
pub struct SyncCoordinator {
    /// Song transports in playback order
    transports: Vec<Transport>,
    /// Current sync mode
    mode: SyncMode,
    /// Current master tempo
    master_tempo: f64,
    /// Baselines, present only in ratio mode
    baselines: Option<BaselineTempoTable>,
    /// Cached ratio per song, ratio mode only
    tempo_ratios: BTreeMap<SongId, f64>,
    /// Smoothing settings
    smoothing: Smoothing,
    /// In-flight tempo transitions
    transitions: HashMap<SongId, TempoTransition>,
    /// Tempo changes not yet forwarded to the audio engine
    pending_tempos: Vec<(SongId, f64)>,
}

impl SyncCoordinator {
    /// Create an empty coordinator in independent mode
    pub fn new(master_tempo: f64, smoothing: Smoothing) -> Result<Self> {
        if !is_valid_tempo(master_tempo) {
            return Err(SyncError::InvalidParameter(format!("master tempo {}", master_tempo)));
        }
        Ok(Self {
            transports: Vec::new(),
            mode: SyncMode::Independent,
            master_tempo,
            baselines: None,
            tempo_ratios: BTreeMap::new(),
            smoothing,
            transitions: HashMap::new(),
            pending_tempos: Vec::new(),
        })
    }

    /// Rebuild a coordinator from restored state.
    ///
    /// Songs keep their stored effective tempo; any mismatch with the
    /// computed target is resolved like a master tempo change.
    pub fn restore(
        transports: Vec<Transport>,
        mode: SyncMode,
        master_tempo: f64,
        baselines: Option<BaselineTempoTable>,
        smoothing: Smoothing,
    ) -> Result<(Self, Vec<SyncError>)> {
        let mut coordinator = Self::new(master_tempo, smoothing)?;
        coordinator.transports = transports;
        coordinator.mode = mode;
        coordinator.baselines = match mode {
            SyncMode::Ratio => Some(baselines.unwrap_or_else(|| BaselineTempoTable::new(master_tempo))),
            _ => None,
        };
        let warnings = coordinator.retarget(true);
        Ok((coordinator, warnings))
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn master_tempo(&self) -> f64 {
        self.master_tempo
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    /// Change smoothing settings; in-flight transitions keep their curve
    pub fn set_smoothing(&mut self, smoothing: Smoothing) {
        self.smoothing = smoothing;
    }

    /// All transports in playback order
    pub fn transports(&self) -> &[Transport] {
        &self.transports
    }

    /// Look up a transport
    pub fn transport(&self, id: &SongId) -> Result<&Transport> {
        self.transports
            .iter()
            .find(|t| t.id() == id)
            .ok_or_else(|| SyncError::UnknownSongId(id.clone()))
    }

    /// Look up a transport for mutation
    pub fn transport_mut(&mut self, id: &SongId) -> Result<&mut Transport> {
        self.transports
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or_else(|| SyncError::UnknownSongId(id.clone()))
    }

    /// Mutable access to every transport, for the position clock
    pub(crate) fn transports_mut(&mut self) -> &mut [Transport] {
        &mut self.transports
    }

    /// Check if a song is in the set
    pub fn contains(&self, id: &SongId) -> bool {
        self.transports.iter().any(|t| t.id() == id)
    }

    /// Check if any song is soloed
    pub fn any_solo(&self) -> bool {
        self.transports.iter().any(|t| t.state().is_solo)
    }

    /// Apply the audibility rule to one song
    pub fn is_audible(&self, id: &SongId) -> Result<bool> {
        let any_solo = self.any_solo();
        Ok(is_audible(self.transport(id)?.state(), any_solo))
    }

    /// Baseline table, present in ratio mode
    pub fn baselines(&self) -> Option<&BaselineTempoTable> {
        self.baselines.as_ref()
    }

    /// Cached tempo ratios
    pub fn tempo_ratios(&self) -> &BTreeMap<SongId, f64> {
        &self.tempo_ratios
    }

    /// Check if any tempo transition is still running
    pub fn is_transitioning(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// Target tempo of a song's in-flight transition
    pub fn transition_target(&self, id: &SongId) -> Option<f64> {
        self.transitions.get(id).map(|t| t.target())
    }

    /// Switch sync mode. Switching to the current mode changes nothing.
    pub fn set_sync_mode(&mut self, mode: SyncMode) -> Vec<SyncError> {
        if mode == self.mode {
            return Vec::new();
        }
        info!(from = self.mode.name(), to = mode.name(), "sync mode change");

        if mode == SyncMode::Ratio {
            let mut table = BaselineTempoTable::new(self.master_tempo);
            for transport in &self.transports {
                table.insert(transport.id().clone(), transport.original_tempo());
            }
            self.baselines = Some(table);
        } else {
            self.baselines = None;
        }
        self.mode = mode;
        self.retarget(true)
    }

    /// Change the master tempo and propagate it to every song
    pub fn set_master_tempo(&mut self, tempo: f64) -> Result<Vec<SyncError>> {
        if !is_valid_tempo(tempo) {
            return Err(SyncError::InvalidParameter(format!("master tempo {}", tempo)));
        }
        self.master_tempo = tempo;
        Ok(self.retarget(true))
    }

    /// Add a song at the end of the set
    pub fn add_song(&mut self, song: SongTransportState) -> Result<Vec<SyncError>> {
        if self.contains(&song.id) {
            return Err(SyncError::DuplicateSongId(song.id));
        }
        let mut transport = Transport::new(song)?;
        let id = transport.id().clone();

        if let Some(table) = self.baselines.as_mut() {
            table.insert(id.clone(), transport.original_tempo());
        }

        let mut warnings = Vec::new();
        let target = self.target_tempo(&transport, &mut warnings);
        transport.set_tempo(target);
        self.pending_tempos.push((id.clone(), transport.effective_tempo()));
        self.transports.push(transport);
        self.refresh_ratios();
        debug!(song = %id, tempo = target, "song added");
        Ok(warnings)
    }

    /// Remove a song and everything kept for it
    pub fn remove_song(&mut self, id: &SongId) -> Result<SongTransportState> {
        let index = self
            .transports
            .iter()
            .position(|t| t.id() == id)
            .ok_or_else(|| SyncError::UnknownSongId(id.clone()))?;
        let transport = self.transports.remove(index);
        if let Some(table) = self.baselines.as_mut() {
            table.remove(id);
        }
        self.tempo_ratios.remove(id);
        self.transitions.remove(id);
        self.pending_tempos.retain(|(song, _)| song != id);
        debug!(song = %id, "song removed");
        Ok(transport.state().clone())
    }

    /// Advance in-flight transitions by `delta_seconds`
    pub fn advance_transitions(&mut self, delta_seconds: f64) {
        if self.transitions.is_empty() {
            return;
        }
        for transport in self.transports.iter_mut() {
            let Some(transition) = self.transitions.get_mut(transport.id()) else {
                continue;
            };
            let tempo = transition.advance(delta_seconds);
            let done = transition.is_complete();
            transport.set_tempo(tempo);
            self.pending_tempos.push((transport.id().clone(), tempo));
            if done {
                self.transitions.remove(transport.id());
            }
        }
    }

    /// Cancel transitions, snapping every song to its target tempo
    pub fn cancel_transitions(&mut self) {
        if self.transitions.is_empty() {
            return;
        }
        debug!(count = self.transitions.len(), "cancelling tempo transitions");
        for transport in self.transports.iter_mut() {
            if let Some(transition) = self.transitions.remove(transport.id()) {
                transport.set_tempo(transition.target());
                self.pending_tempos.push((transport.id().clone(), transition.target()));
            }
        }
    }

    /// Drain tempo changes not yet sent to the audio engine
    pub(crate) fn take_tempo_changes(&mut self) -> Vec<(SongId, f64)> {
        std::mem::take(&mut self.pending_tempos)
    }

    /// Recompute every song's target tempo and apply it
    fn retarget(&mut self, allow_smoothing: bool) -> Vec<SyncError> {
        let mut warnings = Vec::new();
        let smooth = allow_smoothing && self.smoothing.enabled && self.smoothing.duration_secs > 0.0;

        let targets: Vec<f64> = self
            .transports
            .iter()
            .map(|t| self.target_tempo(t, &mut warnings))
            .collect();

        for (transport, target) in self.transports.iter_mut().zip(targets) {
            let id = transport.id().clone();
            let current = transport.effective_tempo();
            if smooth && (current - target).abs() > f64::EPSILON {
                self.transitions.insert(
                    id,
                    TempoTransition::new(current, target, self.smoothing.duration_secs, self.smoothing.curve),
                );
            } else {
                self.transitions.remove(&id);
                if current != target {
                    transport.set_tempo(target);
                    self.pending_tempos.push((id, target));
                }
            }
        }

        self.refresh_ratios();
        warnings
    }

    /// Target tempo for one song; a missing baseline falls back to the
    /// song's own tempo and records a warning
    fn target_tempo(&self, transport: &Transport, warnings: &mut Vec<SyncError>) -> f64 {
        let basis = self.baselines.as_ref().and_then(|table| table.basis(transport.id()));
        match compute_effective_tempo(self.mode, self.master_tempo, transport.original_tempo(), basis) {
            Ok(tempo) if tempo > 0.0 => tempo,
            _ => {
                warn!(song = %transport.id(), "baseline unavailable, using original tempo");
                warnings.push(SyncError::BaselineUnavailable(transport.id().clone()));
                transport.original_tempo()
            }
        }
    }

    fn refresh_ratios(&mut self) {
        self.tempo_ratios.clear();
        let Some(table) = self.baselines.as_ref() else {
            return;
        };
        for transport in &self.transports {
            if let Some(ratio) = table.basis(transport.id()).and_then(|b| tempo_ratio(b).ok()) {
                self.tempo_ratios.insert(transport.id().clone(), ratio);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator_with(songs: &[(&str, f64)]) -> SyncCoordinator {
        let mut coordinator = SyncCoordinator::new(120.0, Smoothing::default()).unwrap();
        for (id, tempo) in songs {
            coordinator
                .add_song(SongTransportState::new(*id, *tempo, 240.0))
                .unwrap();
        }
        coordinator
    }

    fn tempo(coordinator: &SyncCoordinator, id: &str) -> f64 {
        coordinator.transport(&SongId::from(id)).unwrap().effective_tempo()
    }

    #[test]
    fn test_ratio_mode_scales_tempos() {
        let mut coordinator = coordinator_with(&[("a", 120.0), ("b", 90.0)]);
        coordinator.set_sync_mode(SyncMode::Ratio);

        let table = coordinator.baselines().unwrap();
        assert_eq!(table.baseline(&SongId::from("a")), Some(120.0));
        assert_eq!(table.baseline(&SongId::from("b")), Some(90.0));

        coordinator.set_master_tempo(180.0).unwrap();
        assert_eq!(tempo(&coordinator, "a"), 180.0);
        assert_eq!(tempo(&coordinator, "b"), 135.0);
    }

    #[test]
    fn test_ratio_consistency_across_changes() {
        let mut coordinator = coordinator_with(&[("a", 128.0), ("b", 87.0), ("c", 174.0)]);
        coordinator.set_sync_mode(SyncMode::Ratio);

        for master in [60.0, 133.3, 240.0, 97.0, 399.0] {
            coordinator.set_master_tempo(master).unwrap();
            for transport in coordinator.transports() {
                let ratio = coordinator.tempo_ratios()[transport.id()];
                let baseline = coordinator.baselines().unwrap().baseline(transport.id()).unwrap();
                assert!((transport.effective_tempo() / master - ratio).abs() < 1e-9);
                assert!((ratio - baseline / 120.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_locked_parity() {
        let mut coordinator = coordinator_with(&[("a", 120.0), ("b", 90.0)]);
        coordinator.set_sync_mode(SyncMode::Ratio);
        coordinator.set_sync_mode(SyncMode::Locked);
        coordinator.set_master_tempo(100.0).unwrap();

        assert_eq!(tempo(&coordinator, "a"), 100.0);
        assert_eq!(tempo(&coordinator, "b"), 100.0);
        assert!(coordinator.baselines().is_none());
        assert!(coordinator.tempo_ratios().is_empty());
    }

    #[test]
    fn test_independent_restores_original() {
        let mut coordinator = coordinator_with(&[("a", 120.0), ("b", 90.0)]);
        coordinator.set_sync_mode(SyncMode::Locked);
        coordinator.set_master_tempo(150.0).unwrap();
        coordinator.set_sync_mode(SyncMode::Independent);

        assert_eq!(tempo(&coordinator, "a"), 120.0);
        assert_eq!(tempo(&coordinator, "b"), 90.0);
    }

    #[test]
    fn test_same_mode_twice_is_idempotent() {
        let mut coordinator = coordinator_with(&[("a", 120.0), ("b", 90.0)]);
        coordinator.set_sync_mode(SyncMode::Ratio);
        coordinator.set_master_tempo(150.0).unwrap();

        let baselines = coordinator.baselines().cloned();
        let tempos: Vec<f64> = coordinator.transports().iter().map(|t| t.effective_tempo()).collect();

        assert!(coordinator.set_sync_mode(SyncMode::Ratio).is_empty());
        assert_eq!(coordinator.baselines().cloned(), baselines);
        let again: Vec<f64> = coordinator.transports().iter().map(|t| t.effective_tempo()).collect();
        assert_eq!(tempos, again);
    }

    #[test]
    fn test_add_and_remove_in_ratio_mode() {
        let mut coordinator = coordinator_with(&[("a", 120.0)]);
        coordinator.set_sync_mode(SyncMode::Ratio);
        coordinator.set_master_tempo(150.0).unwrap();

        coordinator
            .add_song(SongTransportState::new("b", 96.0, 200.0))
            .unwrap();
        assert_eq!(coordinator.baselines().unwrap().baseline(&SongId::from("b")), Some(96.0));
        assert_eq!(tempo(&coordinator, "b"), 120.0);

        coordinator.remove_song(&SongId::from("b")).unwrap();
        assert_eq!(coordinator.baselines().unwrap().baseline(&SongId::from("b")), None);
        assert!(!coordinator.tempo_ratios().contains_key(&SongId::from("b")));
    }

    #[test]
    fn test_missing_baseline_falls_back() {
        let transports = vec![
            Transport::new(SongTransportState::new("a", 120.0, 60.0)).unwrap(),
            Transport::new(SongTransportState::new("b", 90.0, 60.0)).unwrap(),
        ];
        let mut baselines = BTreeMap::new();
        baselines.insert(SongId::from("a"), 120.0);
        baselines.insert(SongId::from("b"), 0.0);

        let (coordinator, warnings) = SyncCoordinator::restore(
            transports,
            SyncMode::Ratio,
            180.0,
            Some(BaselineTempoTable::from_parts(120.0, baselines)),
            Smoothing::default(),
        )
        .unwrap();

        assert_eq!(warnings, vec![SyncError::BaselineUnavailable(SongId::from("b"))]);
        assert_eq!(tempo(&coordinator, "a"), 180.0);
        assert_eq!(tempo(&coordinator, "b"), 90.0);
        assert!(!coordinator.tempo_ratios().contains_key(&SongId::from("b")));
    }

    #[test]
    fn test_invalid_master_tempo_rejected() {
        let mut coordinator = coordinator_with(&[("a", 120.0)]);
        coordinator.set_sync_mode(SyncMode::Locked);
        assert!(matches!(
            coordinator.set_master_tempo(0.0),
            Err(SyncError::InvalidParameter(_))
        ));
        assert_eq!(coordinator.master_tempo(), 120.0);
        assert_eq!(tempo(&coordinator, "a"), 120.0);
    }

    #[test]
    fn test_duplicate_and_unknown_songs() {
        let mut coordinator = coordinator_with(&[("a", 120.0)]);
        assert!(matches!(
            coordinator.add_song(SongTransportState::new("a", 100.0, 60.0)),
            Err(SyncError::DuplicateSongId(_))
        ));
        assert!(matches!(
            coordinator.remove_song(&SongId::from("zzz")),
            Err(SyncError::UnknownSongId(_))
        ));
        assert_eq!(coordinator.transports().len(), 1);
    }

    #[test]
    fn test_smoothed_master_change() {
        let smoothing = Smoothing {
            enabled: true,
            duration_secs: 1.0,
            curve: TransitionCurve::Linear,
        };
        let mut coordinator = SyncCoordinator::new(120.0, smoothing).unwrap();
        coordinator
            .add_song(SongTransportState::new("a", 120.0, 60.0))
            .unwrap();
        coordinator.set_sync_mode(SyncMode::Locked);
        coordinator.advance_transitions(5.0);

        coordinator.set_master_tempo(160.0).unwrap();
        assert_eq!(tempo(&coordinator, "a"), 120.0);
        assert_eq!(coordinator.transition_target(&SongId::from("a")), Some(160.0));

        coordinator.advance_transitions(0.5);
        assert!((tempo(&coordinator, "a") - 140.0).abs() < 1e-9);

        coordinator.advance_transitions(0.6);
        assert_eq!(tempo(&coordinator, "a"), 160.0);
        assert!(!coordinator.is_transitioning());
    }

    #[test]
    fn test_cancel_snaps_to_target() {
        let smoothing = Smoothing {
            enabled: true,
            duration_secs: 2.0,
            curve: TransitionCurve::EaseInOut,
        };
        let mut coordinator = SyncCoordinator::new(120.0, smoothing).unwrap();
        coordinator
            .add_song(SongTransportState::new("a", 100.0, 60.0))
            .unwrap();
        coordinator.set_sync_mode(SyncMode::Locked);
        coordinator.advance_transitions(0.3);
        assert!(coordinator.is_transitioning());

        coordinator.cancel_transitions();
        assert!(!coordinator.is_transitioning());
        assert_eq!(tempo(&coordinator, "a"), 120.0);
    }

    #[test]
    fn test_tempo_changes_are_queued() {
        let mut coordinator = coordinator_with(&[("a", 120.0), ("b", 90.0)]);
        coordinator.take_tempo_changes();

        coordinator.set_sync_mode(SyncMode::Locked);
        let changes = coordinator.take_tempo_changes();
        // Only the song whose tempo actually moved is reported
        assert_eq!(changes, vec![(SongId::from("b"), 120.0)]);
        assert!(coordinator.take_tempo_changes().is_empty());
    }
}
