// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session configuration.
//!
//! Deployment settings for a coordinator session, loaded from YAML.
//! Every field has a default so an empty file is a valid configuration.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::controller::ControllerOptions;
use crate::state::{MasterState, PlaybackMode};
use crate::sync::Smoothing;
use crate::timing::{
    is_valid_tempo, is_valid_volume, PositionClock, PositionSource, SyncMode, TransitionCurve,
    DEFAULT_TICK_RATE_HZ,
};

/// Root session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub transitions: TransitionConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub master: MasterConfig,
}

impl SessionConfig {
    /// Load a session configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a session configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document parses as unit, not as an empty map
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.clock.tick_rate_hz.is_finite() && self.clock.tick_rate_hz > 0.0) {
            bail!("clock.tick_rate_hz must be positive, got {}", self.clock.tick_rate_hz);
        }
        if !(self.transitions.duration_secs.is_finite() && self.transitions.duration_secs >= 0.0) {
            bail!(
                "transitions.duration_secs must not be negative, got {}",
                self.transitions.duration_secs
            );
        }
        if !(self.playback.cascade_stagger_secs.is_finite() && self.playback.cascade_stagger_secs >= 0.0) {
            bail!(
                "playback.cascade_stagger_secs must not be negative, got {}",
                self.playback.cascade_stagger_secs
            );
        }
        if !is_valid_tempo(self.master.tempo) {
            bail!("master.tempo must be in (0, 400], got {}", self.master.tempo);
        }
        if !is_valid_volume(self.master.volume) {
            bail!("master.volume must be in [0, 1], got {}", self.master.volume);
        }
        Ok(())
    }

    /// Runtime options for the controller
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            smoothing: Smoothing {
                enabled: self.transitions.smooth,
                duration_secs: self.transitions.duration_secs,
                curve: self.transitions.curve,
            },
            cascade_stagger_secs: self.playback.cascade_stagger_secs,
            random_seed: self.playback.random_seed,
            position_source: self.clock.position_source,
        }
    }

    /// Initial master state for a new session
    pub fn master_state(&self) -> MasterState {
        MasterState {
            master_tempo: self.master.tempo,
            master_volume: self.master.volume,
            playback_mode: self.playback.mode,
            sync_mode: self.master.sync_mode,
            ..MasterState::default()
        }
    }

    /// Clock driver for the session
    pub fn position_clock(&self) -> PositionClock {
        PositionClock::new(self.clock.tick_rate_hz)
    }
}

/// Position clock settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClockConfig {
    /// Tick rate in Hz
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: f64,
    /// Integrate positions locally or take them from the engine
    #[serde(default)]
    pub position_source: PositionSource,
}

fn default_tick_rate() -> f64 {
    DEFAULT_TICK_RATE_HZ
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
            position_source: PositionSource::default(),
        }
    }
}

/// Tempo transition settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionConfig {
    /// Interpolate tempo changes instead of stepping
    #[serde(default)]
    pub smooth: bool,
    /// Transition length in seconds
    #[serde(default = "default_transition_duration")]
    pub duration_secs: f64,
    #[serde(default)]
    pub curve: TransitionCurve,
}

fn default_transition_duration() -> f64 {
    0.5
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            smooth: false,
            duration_secs: default_transition_duration(),
            curve: TransitionCurve::default(),
        }
    }
}

/// Playback mode settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// Initial playback mode
    #[serde(default)]
    pub mode: PlaybackMode,
    /// Delay between cascade starts
    #[serde(default = "default_cascade_stagger")]
    pub cascade_stagger_secs: f64,
    /// Seed for random mode
    #[serde(default)]
    pub random_seed: Option<u64>,
}

fn default_cascade_stagger() -> f64 {
    4.0
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::default(),
            cascade_stagger_secs: default_cascade_stagger(),
            random_seed: None,
        }
    }
}

/// Initial master settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterConfig {
    /// Master tempo in BPM
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    /// Master volume (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub sync_mode: SyncMode,
}

fn default_tempo() -> f64 {
    120.0
}

fn default_volume() -> f64 {
    1.0
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            tempo: default_tempo(),
            volume: default_volume(),
            sync_mode: SyncMode::default(),
        }
    }
}
