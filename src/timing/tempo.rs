// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo model.
//!
//! Pure arithmetic deciding a song's effective tempo from the sync mode,
//! the master tempo and the song's own tempo. No state, no I/O.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Upper bound for any authored or master tempo
pub const MAX_TEMPO: f64 = 400.0;

/// How master tempo changes propagate to each song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Every song plays at its own tempo; master has no effect
    #[default]
    Independent,
    /// Every song plays at the master tempo
    Locked,
    /// Every song keeps its tempo relationship to the master captured on entry
    Ratio,
}

impl SyncMode {
    /// Short display name
    pub fn name(&self) -> &'static str {
        match self {
            SyncMode::Independent => "independent",
            SyncMode::Locked => "locked",
            SyncMode::Ratio => "ratio",
        }
    }
}

/// What "1.0x" means for one song in ratio mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioBasis {
    /// Song tempo captured when the baseline was taken
    pub baseline_tempo: f64,
    /// Master tempo in effect when ratio mode was entered
    pub reference_tempo: f64,
}

impl RatioBasis {
    pub fn new(baseline_tempo: f64, reference_tempo: f64) -> Self {
        Self {
            baseline_tempo,
            reference_tempo,
        }
    }
}

/// Check that a tempo lies in `(0, MAX_TEMPO]`
pub fn is_valid_tempo(tempo: f64) -> bool {
    tempo.is_finite() && tempo > 0.0 && tempo <= MAX_TEMPO
}

/// Check that a volume lies in `[0, 1]`
pub fn is_valid_volume(volume: f64) -> bool {
    (0.0..=1.0).contains(&volume)
}

/// Ratio of a song to the master tempo, `baseline / reference`
pub fn tempo_ratio(basis: RatioBasis) -> Result<f64> {
    if basis.baseline_tempo <= 0.0 || basis.reference_tempo <= 0.0 {
        return Err(SyncError::DivisionByZero(format!(
            "baseline {} / reference {}",
            basis.baseline_tempo, basis.reference_tempo
        )));
    }
    Ok(basis.baseline_tempo / basis.reference_tempo)
}

/// Compute the tempo a song should actually play at.
///
/// `basis` is only consulted in ratio mode; a missing basis there is
/// treated as a zero baseline.
pub fn compute_effective_tempo(
    mode: SyncMode,
    master_tempo: f64,
    original_tempo: f64,
    basis: Option<RatioBasis>,
) -> Result<f64> {
    match mode {
        SyncMode::Independent => Ok(original_tempo),
        SyncMode::Locked => Ok(master_tempo),
        SyncMode::Ratio => {
            let basis = basis.unwrap_or(RatioBasis::new(0.0, master_tempo));
            Ok(master_tempo * tempo_ratio(basis)?)
        }
    }
}
