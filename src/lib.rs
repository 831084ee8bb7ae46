// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Walkway - multi-song synchronization and transport coordinator.
//!
//! Keeps several songs playing side by side under one master tempo,
//! volume and transport, with per-song loop, mute and solo, and captures
//! the whole arrangement as versioned presets.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod preset;
pub mod session;
pub mod state;
pub mod sync;
pub mod timing;
pub mod transport;

pub use controller::{ControllerOptions, MasterController, PositionDelta, TickReport};
pub use engine::{AudioEngine, EngineCommand, NullEngine};
pub use error::{Result, SyncError};
pub use preset::{AnySong, MultiSongPreset, RestoreOutcome, SongCatalogue, PRESET_VERSION};
pub use session::{Session, SessionEvent};
pub use state::{MasterState, MultiSongState, PlayState, PlaybackMode, PresetExtras, SongId, SongTransportState};
pub use sync::{BaselineTempoTable, Smoothing, SyncCoordinator};
pub use timing::{compute_effective_tempo, PositionClock, PositionSource, SyncMode, TransitionCurve};
pub use transport::{is_audible, Transport};
