// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing and tempo module.
//!
//! This module provides the tempo model, tempo transitions and the
//! position clock that drives playback.

pub mod clock;
pub mod tempo;
pub mod transition;

pub use clock::{ClockState, PositionClock, PositionSource, TapTempo, DEFAULT_TICK_RATE_HZ};
pub use tempo::{
    compute_effective_tempo, is_valid_tempo, is_valid_volume, tempo_ratio, RatioBasis, SyncMode,
    MAX_TEMPO,
};
pub use transition::{TempoTransition, TransitionCurve};
