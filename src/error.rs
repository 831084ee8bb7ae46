// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types for the walkway coordinator.
//!
//! Every failure in the core is returned as a `SyncError`; nothing here
//! panics on bad input, so a rejected command never corrupts the session.

use thiserror::Error;

use crate::state::SongId;

/// Error kinds returned by commands, the tempo model and the preset codec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Tempo or volume outside its allowed range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Loop region is not `0 <= start < end <= duration`
    #[error("invalid loop region [{start}, {end}) for duration {duration}")]
    InvalidLoopRegion { start: f64, end: f64, duration: f64 },

    /// Ratio mode without a usable baseline; the song falls back to its own tempo
    #[error("baseline tempo unavailable for song {0}")]
    BaselineUnavailable(SongId),

    /// Command referenced a song that is not in the session
    #[error("unknown song id: {0}")]
    UnknownSongId(SongId),

    /// Song id already present in the session
    #[error("duplicate song id: {0}")]
    DuplicateSongId(SongId),

    /// Preset capture or restore found inconsistent data
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Ratio arithmetic with a zero or negative denominator
    #[error("division by zero: {0}")]
    DivisionByZero(String),

    /// Preset blob could not be encoded or decoded
    #[error("preset codec error: {0}")]
    Codec(String),

    /// External preset repository failure
    #[error("preset store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

/// Convenience result type for the coordinator
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncError::InvalidLoopRegion {
            start: 20.0,
            end: 10.0,
            duration: 60.0,
        };
        assert_eq!(err.to_string(), "invalid loop region [20, 10) for duration 60");

        let err = SyncError::UnknownSongId(SongId::from("intro"));
        assert_eq!(err.to_string(), "unknown song id: intro");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: SyncError = parse.unwrap_err().into();
        assert!(matches!(err, SyncError::Codec(_)));
    }
}
