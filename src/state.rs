// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session data model.
//!
//! Plain, cloneable state types. The live session owns one
//! `MultiSongState` worth of data spread across its components; observers
//! only ever see copies produced by `snapshot()`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::timing::SyncMode;
use crate::transport::is_audible;

/// Stable identity of a song within a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(String);

impl SongId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SongId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SongId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport state shared by songs and the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Which songs start on a master `play`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackMode {
    /// Every eligible song at once
    #[default]
    Simultaneous,
    /// One song at a time, in order
    RoundRobin,
    /// One uniformly random eligible song at a time
    Random,
    /// Every eligible song, staggered in time
    Cascade,
}

/// Playback state of a single song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongTransportState {
    /// Stable identity
    pub id: SongId,
    /// Intrinsic tempo of the source material
    pub original_tempo: f64,
    /// Tempo the song is currently playing at
    pub effective_tempo: f64,
    /// Elapsed time in seconds
    pub position: f64,
    /// Length in seconds
    pub duration: f64,
    /// Song volume (0.0 - 1.0)
    pub volume: f64,
    /// Transport state
    pub play_state: PlayState,
    pub is_muted: bool,
    pub is_solo: bool,
    pub loop_enabled: bool,
    pub loop_start: f64,
    pub loop_end: f64,
}

impl SongTransportState {
    /// Create a stopped song at its own tempo, full volume, no loop
    pub fn new(id: impl Into<SongId>, original_tempo: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            original_tempo,
            effective_tempo: original_tempo,
            position: 0.0,
            duration,
            volume: 1.0,
            play_state: PlayState::Stopped,
            is_muted: false,
            is_solo: false,
            loop_enabled: false,
            loop_start: 0.0,
            loop_end: duration,
        }
    }

    /// Set the initial volume
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Check if playing
    pub fn is_playing(&self) -> bool {
        self.play_state == PlayState::Playing
    }

    /// Playback speed relative to the source material
    pub fn tempo_scale(&self) -> f64 {
        self.effective_tempo / self.original_tempo
    }
}

/// Master transport and sync settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterState {
    pub master_tempo: f64,
    pub master_volume: f64,
    pub play_state: PlayState,
    pub playback_mode: PlaybackMode,
    pub sync_mode: SyncMode,
}

impl MasterState {
    /// Check if playing
    pub fn is_playing(&self) -> bool {
        self.play_state == PlayState::Playing
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self {
            master_tempo: 120.0,
            master_volume: 1.0,
            play_state: PlayState::Stopped,
            playback_mode: PlaybackMode::Simultaneous,
            sync_mode: SyncMode::Independent,
        }
    }
}

/// Preset fields this version does not understand, held so a loaded
/// preset can be saved again without losing them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetExtras {
    /// Unknown top-level fields
    #[serde(default)]
    pub preset: Map<String, Value>,
    /// Unknown fields of the master section
    #[serde(default)]
    pub master: Map<String, Value>,
    /// Unknown fields per song; songs without any are absent
    #[serde(default)]
    pub songs: BTreeMap<SongId, Map<String, Value>>,
}

impl PresetExtras {
    pub fn is_empty(&self) -> bool {
        self.preset.is_empty() && self.master.is_empty() && self.songs.is_empty()
    }

    /// Unknown fields of one song
    pub fn song(&self, id: &SongId) -> Option<&Map<String, Value>> {
        self.songs.get(id)
    }
}

/// Complete multi-song configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSongState {
    pub id: Uuid,
    /// Songs in playback order
    pub songs: Vec<SongTransportState>,
    pub master: MasterState,
    /// Song tempos captured on entering ratio mode
    pub baseline_tempos: BTreeMap<SongId, f64>,
    /// Master tempo captured on entering ratio mode
    pub ratio_reference_tempo: Option<f64>,
    /// Cached `baseline / reference` per song
    pub tempo_ratios: BTreeMap<SongId, f64>,
    /// Unknown fields carried over from the preset this state came from
    #[serde(default, skip_serializing_if = "PresetExtras::is_empty")]
    pub preset_extras: PresetExtras,
}

impl MultiSongState {
    /// Create an empty state with a fresh id
    pub fn new(master: MasterState) -> Self {
        Self {
            id: Uuid::new_v4(),
            songs: Vec::new(),
            master,
            baseline_tempos: BTreeMap::new(),
            ratio_reference_tempo: None,
            tempo_ratios: BTreeMap::new(),
            preset_extras: PresetExtras::default(),
        }
    }

    /// Look up a song
    pub fn song(&self, id: &SongId) -> Option<&SongTransportState> {
        self.songs.iter().find(|song| &song.id == id)
    }

    /// Check if any song is soloed
    pub fn any_solo(&self) -> bool {
        self.songs.iter().any(|song| song.is_solo)
    }

    /// Apply the audibility rule to one song
    pub fn is_audible(&self, id: &SongId) -> bool {
        let any_solo = self.any_solo();
        self.song(id).map(|song| is_audible(song, any_solo)).unwrap_or(false)
    }

    /// Ids of every song that is currently heard
    pub fn audible_songs(&self) -> Vec<SongId> {
        let any_solo = self.any_solo();
        self.songs
            .iter()
            .filter(|song| is_audible(song, any_solo))
            .map(|song| song.id.clone())
            .collect()
    }
}

impl Default for MultiSongState {
    fn default() -> Self {
        Self::new(MasterState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_defaults() {
        let song = SongTransportState::new("a", 120.0, 180.0);
        assert_eq!(song.effective_tempo, 120.0);
        assert_eq!(song.loop_end, 180.0);
        assert_eq!(song.volume, 1.0);
        assert!(!song.is_playing());
        assert_eq!(song.tempo_scale(), 1.0);
    }

    #[test]
    fn test_audible_songs_with_solo() {
        let mut state = MultiSongState::default();
        let mut muted_solo = SongTransportState::new("a", 120.0, 60.0);
        muted_solo.is_muted = true;
        muted_solo.is_solo = true;
        state.songs.push(muted_solo);
        state.songs.push(SongTransportState::new("b", 90.0, 60.0));

        assert_eq!(state.audible_songs(), vec![SongId::from("a")]);
        assert!(!state.is_audible(&SongId::from("b")));
        assert!(!state.is_audible(&SongId::from("missing")));
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&PlaybackMode::RoundRobin).unwrap(), "\"roundRobin\"");
        assert_eq!(serde_json::to_string(&PlayState::Paused).unwrap(), "\"paused\"");
        assert_eq!(serde_json::to_string(&SongId::from("x")).unwrap(), "\"x\"");
    }
}
