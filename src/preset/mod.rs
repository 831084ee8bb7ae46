// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Preset capture, validation and restore.
//!
//! A preset is a versioned JSON snapshot of the whole multi-song state.
//! Fields this version does not know about are kept in `extra` maps,
//! carried through a restored state as `PresetExtras` and written back out
//! unchanged on the next capture.

pub mod store;

pub use store::{MemoryPresetStore, PresetStore};

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::state::{MasterState, MultiSongState, PlayState, PlaybackMode, PresetExtras, SongId, SongTransportState};
use crate::timing::{is_valid_tempo, is_valid_volume, tempo_ratio, RatioBasis, SyncMode};
use crate::transport::{check_loop_region, normalize_disabled_loop};

/// Current preset format version
pub const PRESET_VERSION: u32 = 1;

/// Master section of a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterRecord {
    pub master_tempo: f64,
    pub master_volume: f64,
    pub sync_mode: SyncMode,
    pub playback_mode: PlaybackMode,
    #[serde(default)]
    pub play_state: PlayState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One song in a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub id: SongId,
    pub original_tempo: f64,
    pub volume: f64,
    pub is_muted: bool,
    pub is_solo: bool,
    pub loop_start: f64,
    pub loop_end: f64,
    pub loop_enabled: bool,
    /// Song length; falls back to the catalogue when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub position: f64,
    /// Tempo at capture time; recomputed from the sync mode when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_tempo: Option<f64>,
    #[serde(default)]
    pub play_state: PlayState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SongRecord {
    fn from_state(song: &SongTransportState, extras: &PresetExtras) -> Self {
        Self {
            id: song.id.clone(),
            original_tempo: song.original_tempo,
            volume: song.volume,
            is_muted: song.is_muted,
            is_solo: song.is_solo,
            loop_start: song.loop_start,
            loop_end: song.loop_end,
            loop_enabled: song.loop_enabled,
            duration: Some(song.duration),
            position: song.position,
            effective_tempo: Some(song.effective_tempo),
            play_state: song.play_state,
            extra: extras.song(&song.id).cloned().unwrap_or_default(),
        }
    }

    /// Rebuild the song, checking every range
    fn to_state(&self, catalogue: &dyn SongCatalogue) -> Result<SongTransportState> {
        let duration = self
            .duration
            .or_else(|| catalogue.duration(&self.id))
            .ok_or_else(|| SyncError::ValidationFailed(format!("song {} has no duration", self.id)))?;

        let mut song = SongTransportState {
            id: self.id.clone(),
            original_tempo: self.original_tempo,
            effective_tempo: self.effective_tempo.unwrap_or(self.original_tempo),
            position: self.position,
            duration,
            volume: self.volume,
            play_state: self.play_state,
            is_muted: self.is_muted,
            is_solo: self.is_solo,
            loop_enabled: self.loop_enabled,
            loop_start: self.loop_start,
            loop_end: self.loop_end,
        };
        normalize_disabled_loop(&mut song);
        validate_song(&song)?;
        Ok(song)
    }
}

/// Named, versioned snapshot of a multi-song state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSongPreset {
    pub version: u32,
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub master: MasterRecord,
    pub songs: Vec<SongRecord>,
    #[serde(default)]
    pub baseline_tempos: BTreeMap<SongId, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio_reference_tempo: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of restoring a preset
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub state: MultiSongState,
    /// Songs left out, either missing from the catalogue or invalid
    pub dropped: Vec<SongId>,
    pub warnings: Vec<SyncError>,
}

/// Songs available to a restore
pub trait SongCatalogue {
    /// Check if a song can be loaded
    fn contains(&self, id: &SongId) -> bool;

    /// Known length of a song
    fn duration(&self, _id: &SongId) -> Option<f64> {
        None
    }
}

impl SongCatalogue for HashSet<SongId> {
    fn contains(&self, id: &SongId) -> bool {
        HashSet::contains(self, id)
    }
}

/// Catalogue keyed by song id with each song's duration
impl SongCatalogue for HashMap<SongId, f64> {
    fn contains(&self, id: &SongId) -> bool {
        self.contains_key(id)
    }

    fn duration(&self, id: &SongId) -> Option<f64> {
        self.get(id).copied()
    }
}

/// Catalogue that accepts every song
#[derive(Debug, Default, Clone, Copy)]
pub struct AnySong;

impl SongCatalogue for AnySong {
    fn contains(&self, _id: &SongId) -> bool {
        true
    }
}

fn validate_master(master: &MasterState) -> Result<()> {
    if !is_valid_tempo(master.master_tempo) {
        return Err(SyncError::ValidationFailed(format!(
            "master tempo {} outside (0, 400]",
            master.master_tempo
        )));
    }
    if !is_valid_volume(master.master_volume) {
        return Err(SyncError::ValidationFailed(format!(
            "master volume {} outside [0, 1]",
            master.master_volume
        )));
    }
    Ok(())
}

fn validate_song(song: &SongTransportState) -> Result<()> {
    let fail = |what: String| Err(SyncError::ValidationFailed(format!("song {}: {}", song.id, what)));

    if !is_valid_tempo(song.original_tempo) {
        return fail(format!("original tempo {} outside (0, 400]", song.original_tempo));
    }
    if !(song.effective_tempo.is_finite() && song.effective_tempo > 0.0) {
        return fail(format!("effective tempo {}", song.effective_tempo));
    }
    if !is_valid_volume(song.volume) {
        return fail(format!("volume {} outside [0, 1]", song.volume));
    }
    if !(song.duration.is_finite() && song.duration > 0.0) {
        return fail(format!("duration {}", song.duration));
    }
    if !(song.position.is_finite() && (0.0..=song.duration).contains(&song.position)) {
        return fail(format!("position {} outside [0, {}]", song.position, song.duration));
    }
    if song.loop_enabled {
        if let Err(err) = check_loop_region(song.loop_start, song.loop_end, song.duration) {
            return fail(err.to_string());
        }
    }
    Ok(())
}

/// Cached ratios for the given songs, skipping any without a usable basis
fn ratios_for(songs: &[SongTransportState], baselines: &BTreeMap<SongId, f64>, reference: f64) -> BTreeMap<SongId, f64> {
    songs
        .iter()
        .filter_map(|song| {
            let baseline = *baselines.get(&song.id)?;
            let ratio = tempo_ratio(RatioBasis::new(baseline, reference)).ok()?;
            Some((song.id.clone(), ratio))
        })
        .collect()
}

impl MultiSongPreset {
    /// Deep-copy a state into a preset. Fails without producing a partial
    /// preset if any value is out of range.
    pub fn capture(state: &MultiSongState, name: impl Into<String>) -> Result<Self> {
        validate_master(&state.master)?;
        let mut seen = HashSet::new();
        for song in &state.songs {
            if !seen.insert(&song.id) {
                return Err(SyncError::ValidationFailed(format!("duplicate song id {}", song.id)));
            }
            validate_song(song)?;
        }
        if let Some((id, tempo)) = state.baseline_tempos.iter().find(|(_, t)| !t.is_finite() || **t < 0.0) {
            return Err(SyncError::ValidationFailed(format!("baseline tempo {} for song {}", tempo, id)));
        }

        let preset = Self {
            version: PRESET_VERSION,
            id: state.id,
            name: name.into(),
            created_at: Utc::now(),
            master: MasterRecord {
                master_tempo: state.master.master_tempo,
                master_volume: state.master.master_volume,
                sync_mode: state.master.sync_mode,
                playback_mode: state.master.playback_mode,
                play_state: state.master.play_state,
                extra: state.preset_extras.master.clone(),
            },
            songs: state
                .songs
                .iter()
                .map(|song| SongRecord::from_state(song, &state.preset_extras))
                .collect(),
            baseline_tempos: state.baseline_tempos.clone(),
            ratio_reference_tempo: state.ratio_reference_tempo,
            extra: state.preset_extras.preset.clone(),
        };
        debug!(preset = %preset.name, songs = preset.songs.len(), "preset captured");
        Ok(preset)
    }

    /// Check the preset without restoring it.
    ///
    /// Out-of-range values are errors; an empty song list only yields a
    /// warning.
    pub fn validate(&self) -> Result<Vec<SyncError>> {
        if self.version == 0 {
            return Err(SyncError::ValidationFailed("preset version 0".to_string()));
        }
        validate_master(&self.master_state())?;

        let mut seen = HashSet::new();
        for record in &self.songs {
            if !seen.insert(&record.id) {
                return Err(SyncError::ValidationFailed(format!("duplicate song id {}", record.id)));
            }
            record.to_state(&AnySong)?;
        }

        let mut warnings = Vec::new();
        if self.songs.is_empty() {
            warnings.push(SyncError::ValidationFailed(format!("preset {} has no songs", self.name)));
        }
        Ok(warnings)
    }

    /// Rebuild a state. Songs missing from the catalogue or holding bad
    /// values are dropped and reported; the rest are restored.
    pub fn restore(&self, catalogue: &dyn SongCatalogue) -> Result<RestoreOutcome> {
        if self.version == 0 {
            return Err(SyncError::ValidationFailed("preset version 0".to_string()));
        }
        if self.version > PRESET_VERSION {
            warn!(version = self.version, supported = PRESET_VERSION, "preset written by a newer version");
        }
        let master = self.master_state();
        validate_master(&master)?;

        let mut songs: Vec<SongTransportState> = Vec::with_capacity(self.songs.len());
        let mut dropped = Vec::new();
        let mut warnings = Vec::new();
        let mut song_extras = BTreeMap::new();

        for record in &self.songs {
            if !catalogue.contains(&record.id) {
                warn!(song = %record.id, "song not in catalogue, dropped from preset");
                warnings.push(SyncError::UnknownSongId(record.id.clone()));
                dropped.push(record.id.clone());
                continue;
            }
            if songs.iter().any(|song| song.id == record.id) {
                warn!(song = %record.id, "duplicate song in preset, dropped");
                warnings.push(SyncError::DuplicateSongId(record.id.clone()));
                dropped.push(record.id.clone());
                continue;
            }
            match record.to_state(catalogue) {
                Ok(song) => {
                    if !record.extra.is_empty() {
                        song_extras.insert(song.id.clone(), record.extra.clone());
                    }
                    songs.push(song);
                }
                Err(err) => {
                    warn!(song = %record.id, error = %err, "invalid song dropped from preset");
                    warnings.push(err);
                    dropped.push(record.id.clone());
                }
            }
        }

        let mut state = MultiSongState::new(master);
        state.id = self.id;

        if state.master.sync_mode == SyncMode::Ratio {
            let reference = self.ratio_reference_tempo.unwrap_or(state.master.master_tempo);
            let baselines: BTreeMap<SongId, f64> = self
                .baseline_tempos
                .iter()
                .filter(|(id, _)| songs.iter().any(|song| &song.id == *id))
                .map(|(id, tempo)| (id.clone(), *tempo))
                .collect();
            state.tempo_ratios = ratios_for(&songs, &baselines, reference);
            state.baseline_tempos = baselines;
            state.ratio_reference_tempo = Some(reference);
        }
        state.preset_extras = PresetExtras {
            preset: self.extra.clone(),
            master: self.master.extra.clone(),
            songs: song_extras,
        };
        state.songs = songs;

        if state.songs.is_empty() && !self.songs.is_empty() {
            warn!(preset = %self.name, "every song in the preset was dropped");
        }
        debug!(preset = %self.name, songs = state.songs.len(), dropped = dropped.len(), "preset restored");
        Ok(RestoreOutcome {
            state,
            dropped,
            warnings,
        })
    }

    /// Encode as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON; unknown fields are kept
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn master_state(&self) -> MasterState {
        MasterState {
            master_tempo: self.master.master_tempo,
            master_volume: self.master.master_volume,
            play_state: self.master.play_state,
            playback_mode: self.master.playback_mode,
            sync_mode: self.master.sync_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> MultiSongState {
        let mut state = MultiSongState::default();
        state.master.master_tempo = 150.0;
        state.master.sync_mode = SyncMode::Ratio;

        let mut a = SongTransportState::new("a", 120.0, 200.0);
        a.effective_tempo = 150.0;
        a.position = 31.5;
        let mut b = SongTransportState::new("b", 90.0, 60.0);
        b.effective_tempo = 112.5;
        b.loop_enabled = true;
        b.loop_start = 10.0;
        b.loop_end = 20.0;
        b.position = 12.0;
        b.is_solo = true;
        b.volume = 0.4;
        state.songs = vec![a, b];

        state.baseline_tempos.insert(SongId::from("a"), 120.0);
        state.baseline_tempos.insert(SongId::from("b"), 90.0);
        state.ratio_reference_tempo = Some(120.0);
        state.tempo_ratios.insert(SongId::from("a"), 1.0);
        state.tempo_ratios.insert(SongId::from("b"), 0.75);
        state
    }

    #[test]
    fn test_capture_restore_round_trip() {
        let state = sample_state();
        let preset = MultiSongPreset::capture(&state, "set one").unwrap();
        let outcome = preset.restore(&AnySong).unwrap();
        assert_eq!(outcome.state, state);
        assert!(outcome.dropped.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_capture_is_independent_of_live_state() {
        let mut state = sample_state();
        let preset = MultiSongPreset::capture(&state, "set").unwrap();
        state.songs[0].volume = 0.1;
        assert_eq!(preset.songs[0].volume, 1.0);
    }

    #[test]
    fn test_capture_rejects_out_of_range() {
        let mut state = sample_state();
        state.songs[1].volume = 1.5;
        assert!(matches!(
            MultiSongPreset::capture(&state, "bad"),
            Err(SyncError::ValidationFailed(_))
        ));

        let mut state = sample_state();
        state.master.master_tempo = 450.0;
        assert!(matches!(
            MultiSongPreset::capture(&state, "bad"),
            Err(SyncError::ValidationFailed(_))
        ));

        let mut state = sample_state();
        state.songs[1].loop_end = 5.0;
        assert!(matches!(
            MultiSongPreset::capture(&state, "bad"),
            Err(SyncError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_restore_drops_missing_songs() {
        let preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        let catalogue: HashSet<SongId> = [SongId::from("b")].into_iter().collect();

        let outcome = preset.restore(&catalogue).unwrap();
        assert_eq!(outcome.dropped, vec![SongId::from("a")]);
        assert_eq!(outcome.state.songs.len(), 1);
        assert!(!outcome.state.baseline_tempos.contains_key(&SongId::from("a")));
        assert!(!outcome.state.tempo_ratios.contains_key(&SongId::from("a")));
        assert_eq!(outcome.warnings, vec![SyncError::UnknownSongId(SongId::from("a"))]);
    }

    #[test]
    fn test_restore_drops_only_invalid_song() {
        let mut preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        preset.songs[0].volume = 3.0;

        let outcome = preset.restore(&AnySong).unwrap();
        assert_eq!(outcome.dropped, vec![SongId::from("a")]);
        assert_eq!(outcome.state.songs[0].id, SongId::from("b"));
        assert!(matches!(outcome.warnings[0], SyncError::ValidationFailed(_)));
    }

    #[test]
    fn test_restore_uses_catalogue_duration() {
        let mut preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        preset.songs[0].duration = None;

        let mut catalogue = HashMap::new();
        catalogue.insert(SongId::from("a"), 240.0);
        catalogue.insert(SongId::from("b"), 60.0);

        let outcome = preset.restore(&catalogue).unwrap();
        assert_eq!(outcome.state.songs[0].duration, 240.0);

        let outcome = preset.restore(&AnySong).unwrap();
        assert_eq!(outcome.dropped, vec![SongId::from("a")]);
    }

    #[test]
    fn test_restore_rejects_bad_master() {
        let mut preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        preset.master.master_volume = -1.0;
        assert!(matches!(preset.restore(&AnySong), Err(SyncError::ValidationFailed(_))));
    }

    #[test]
    fn test_validate_warns_on_empty() {
        let preset = MultiSongPreset::capture(&MultiSongState::default(), "empty").unwrap();
        let warnings = preset.validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_json_field_names() {
        let preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        let value: Value = serde_json::from_str(&preset.to_json().unwrap()).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["master"]["masterTempo"], 150.0);
        assert_eq!(value["master"]["syncMode"], "ratio");
        assert_eq!(value["master"]["playbackMode"], "simultaneous");
        assert_eq!(value["songs"][1]["isSolo"], true);
        assert_eq!(value["songs"][1]["loopStart"], 10.0);
        assert_eq!(value["baselineTempos"]["b"], 90.0);
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        let mut value: Value = serde_json::from_str(&preset.to_json().unwrap()).unwrap();
        value["colorTheme"] = Value::from("amber");
        value["master"]["swing"] = Value::from(0.12);
        value["songs"][0]["artist"] = serde_json::json!({ "name": "Someone" });

        let decoded = MultiSongPreset::from_json(&value.to_string()).unwrap();
        assert_eq!(decoded.extra["colorTheme"], "amber");

        let reencoded: Value = serde_json::from_str(&decoded.to_json().unwrap()).unwrap();
        assert_eq!(reencoded, value);
    }

    #[test]
    fn test_unknown_fields_survive_restore_and_capture() {
        let preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        let mut value: Value = serde_json::from_str(&preset.to_json().unwrap()).unwrap();
        value["lighting"] = Value::from("blue wash");
        value["master"]["swing"] = Value::from(0.12);
        value["songs"][1]["key"] = Value::from("F#m");

        let decoded = MultiSongPreset::from_json(&value.to_string()).unwrap();
        let outcome = decoded.restore(&AnySong).unwrap();
        let extras = &outcome.state.preset_extras;
        assert_eq!(extras.preset["lighting"], "blue wash");
        assert_eq!(extras.master["swing"], 0.12);
        assert!(extras.song(&SongId::from("a")).is_none());
        assert_eq!(extras.song(&SongId::from("b")).unwrap()["key"], "F#m");

        let again = MultiSongPreset::capture(&outcome.state, "set").unwrap();
        assert_eq!(again.extra["lighting"], "blue wash");
        assert_eq!(again.master.extra["swing"], 0.12);
        assert!(again.songs[0].extra.is_empty());
        assert_eq!(again.songs[1].extra["key"], "F#m");
    }

    #[test]
    fn test_restore_keeps_song_with_disabled_empty_loop() {
        let mut preset = MultiSongPreset::capture(&sample_state(), "set").unwrap();
        preset.songs[0].loop_start = 0.0;
        preset.songs[0].loop_end = 0.0;
        preset.songs[0].loop_enabled = false;
        assert!(preset.validate().is_ok());

        let outcome = preset.restore(&AnySong).unwrap();
        assert!(outcome.dropped.is_empty());
        assert!(outcome.warnings.is_empty());
        let a = outcome.state.song(&SongId::from("a")).unwrap();
        assert_eq!(a.loop_start, 0.0);
        assert_eq!(a.loop_end, 200.0);

        // An enabled loop with the same bounds is still rejected
        preset.songs[0].loop_enabled = true;
        let outcome = preset.restore(&AnySong).unwrap();
        assert_eq!(outcome.dropped, vec![SongId::from("a")]);
    }

    #[test]
    fn test_malformed_json_is_codec_error() {
        assert!(matches!(
            MultiSongPreset::from_json("{ not json"),
            Err(SyncError::Codec(_))
        ));
    }
}
