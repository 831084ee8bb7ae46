// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Per-song transport.
//!
//! Owns one song's play state, position, volume, mute/solo flags and loop
//! region. Tempo is pushed in by the sync coordinator; position is moved
//! by the position clock or by explicit seeks.

use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::state::{PlayState, SongId, SongTransportState};
use crate::timing::{is_valid_tempo, is_valid_volume};

/// Audibility rule: soloed songs are always heard; otherwise a song is
/// heard only when nothing is soloed and it is not muted.
pub fn is_audible(song: &SongTransportState, any_solo: bool) -> bool {
    song.is_solo || (!any_solo && !song.is_muted)
}

/// Result of advancing a transport by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Not playing, nothing moved
    Idle,
    /// Position moved forward
    Advanced,
    /// Position passed the loop end and wrapped to the loop start
    Wrapped,
    /// Position reached the end of the song and the transport stopped
    Finished,
}

/// Playback state machine for a single song
#[derive(Debug, Clone, PartialEq)]
pub struct Transport {
    state: SongTransportState,
}

pub(crate) fn check_loop_region(start: f64, end: f64, duration: f64) -> Result<()> {
    if start.is_finite() && end.is_finite() && 0.0 <= start && start < end && end <= duration {
        Ok(())
    } else {
        Err(SyncError::InvalidLoopRegion {
            start,
            end,
            duration,
        })
    }
}

/// Reset a disabled loop whose bounds do not fit the song to the whole song
pub(crate) fn normalize_disabled_loop(song: &mut SongTransportState) {
    if !song.loop_enabled && check_loop_region(song.loop_start, song.loop_end, song.duration).is_err() {
        debug!(song = %song.id, start = song.loop_start, end = song.loop_end, "disabled loop region reset");
        song.loop_start = 0.0;
        song.loop_end = song.duration;
    }
}

fn wrap_into(position: f64, start: f64, end: f64) -> f64 {
    let wrapped = start + (position - start).rem_euclid(end - start);
    // rem_euclid can round up to the full length for tiny negative offsets
    if wrapped >= end {
        start
    } else {
        wrapped
    }
}

impl Transport {
    /// Create a transport from a song description, validating it first
    pub fn new(mut song: SongTransportState) -> Result<Self> {
        if !is_valid_tempo(song.original_tempo) {
            return Err(SyncError::InvalidParameter(format!(
                "original tempo {} for song {}",
                song.original_tempo, song.id
            )));
        }
        if !(song.duration.is_finite() && song.duration > 0.0) {
            return Err(SyncError::InvalidParameter(format!(
                "duration {} for song {}",
                song.duration, song.id
            )));
        }
        if !is_valid_volume(song.volume) {
            return Err(SyncError::InvalidParameter(format!(
                "volume {} for song {}",
                song.volume, song.id
            )));
        }
        if song.loop_enabled {
            check_loop_region(song.loop_start, song.loop_end, song.duration)?;
        } else {
            normalize_disabled_loop(&mut song);
        }

        let mut transport = Self { state: song };
        if !(transport.state.effective_tempo > 0.0) {
            transport.state.effective_tempo = transport.state.original_tempo;
        }
        let position = transport.state.position;
        transport.state.position = transport.normalize(if position.is_finite() { position } else { 0.0 });
        Ok(transport)
    }

    /// Song id
    pub fn id(&self) -> &SongId {
        &self.state.id
    }

    /// Current state
    pub fn state(&self) -> &SongTransportState {
        &self.state
    }

    /// Current play state
    pub fn play_state(&self) -> PlayState {
        self.state.play_state
    }

    /// Check if playing
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Current position in seconds
    pub fn position(&self) -> f64 {
        self.state.position
    }

    /// Current effective tempo
    pub fn effective_tempo(&self) -> f64 {
        self.state.effective_tempo
    }

    /// Intrinsic tempo
    pub fn original_tempo(&self) -> f64 {
        self.state.original_tempo
    }

    /// Start or resume playback. A finished song starts again from the top.
    pub fn play(&mut self) {
        if self.state.play_state == PlayState::Playing {
            return;
        }
        if !self.state.loop_enabled && self.state.position >= self.state.duration {
            self.state.position = 0.0;
        }
        self.state.play_state = PlayState::Playing;
        debug!(song = %self.state.id, position = self.state.position, "transport playing");
    }

    /// Pause playback, keeping the position
    pub fn pause(&mut self) {
        if self.state.play_state == PlayState::Playing {
            self.state.play_state = PlayState::Paused;
        }
    }

    /// Stop playback. The position is kept; seek to rewind.
    pub fn stop(&mut self) {
        self.state.play_state = PlayState::Stopped;
    }

    /// Move to `position`, clamped to the song or wrapped into the loop
    pub fn seek(&mut self, position: f64) -> Result<f64> {
        if !position.is_finite() {
            return Err(SyncError::InvalidParameter(format!("seek position {}", position)));
        }
        self.state.position = self.normalize(position);
        Ok(self.state.position)
    }

    /// Configure the loop region
    pub fn set_loop(&mut self, start: f64, end: f64, enabled: bool) -> Result<()> {
        check_loop_region(start, end, self.state.duration)?;
        self.state.loop_start = start;
        self.state.loop_end = end;
        self.state.loop_enabled = enabled;
        self.state.position = self.normalize(self.state.position);
        Ok(())
    }

    /// Apply a new effective tempo immediately
    pub(crate) fn set_tempo(&mut self, effective_tempo: f64) {
        if effective_tempo.is_finite() && effective_tempo > 0.0 {
            self.state.effective_tempo = effective_tempo;
        } else {
            warn!(song = %self.state.id, tempo = effective_tempo, "ignoring non-positive tempo");
        }
    }

    /// Set the song volume
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        if !is_valid_volume(volume) {
            return Err(SyncError::InvalidParameter(format!("volume {}", volume)));
        }
        self.state.volume = volume;
        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.is_muted = muted;
    }

    pub fn set_solo(&mut self, solo: bool) {
        self.state.is_solo = solo;
    }

    /// Advance a playing transport by `delta_seconds` of wall-clock time
    pub fn advance(&mut self, delta_seconds: f64) -> AdvanceOutcome {
        if !self.is_playing() {
            return AdvanceOutcome::Idle;
        }
        let delta = if delta_seconds.is_finite() { delta_seconds.max(0.0) } else { 0.0 };
        let next = self.state.position + delta * self.state.tempo_scale();

        if self.state.loop_enabled {
            if next >= self.state.loop_end {
                self.state.position = wrap_into(next, self.state.loop_start, self.state.loop_end);
                return AdvanceOutcome::Wrapped;
            }
            self.state.position = next;
            return AdvanceOutcome::Advanced;
        }

        if next >= self.state.duration {
            self.state.position = self.state.duration;
            self.state.play_state = PlayState::Stopped;
            debug!(song = %self.state.id, "transport reached end");
            return AdvanceOutcome::Finished;
        }
        self.state.position = next;
        AdvanceOutcome::Advanced
    }

    /// Overwrite the position of a playing transport with the engine's
    /// reported value
    pub fn reconcile(&mut self, position: f64) -> AdvanceOutcome {
        if !self.is_playing() {
            return AdvanceOutcome::Idle;
        }
        if !position.is_finite() {
            return AdvanceOutcome::Idle;
        }
        if !self.state.loop_enabled && position >= self.state.duration {
            self.state.position = self.state.duration;
            self.state.play_state = PlayState::Stopped;
            return AdvanceOutcome::Finished;
        }
        let previous = self.state.position;
        self.state.position = self.normalize(position);
        if self.state.loop_enabled && self.state.position < previous {
            AdvanceOutcome::Wrapped
        } else {
            AdvanceOutcome::Advanced
        }
    }

    fn normalize(&self, position: f64) -> f64 {
        let clamped = position.clamp(0.0, self.state.duration);
        if self.state.loop_enabled {
            wrap_into(clamped, self.state.loop_start, self.state.loop_end)
        } else {
            clamped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(duration: f64) -> Transport {
        Transport::new(SongTransportState::new("song", 120.0, duration)).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let mut transport = song(60.0);
        assert_eq!(transport.play_state(), PlayState::Stopped);

        transport.pause(); // no-op while stopped
        assert_eq!(transport.play_state(), PlayState::Stopped);

        transport.play();
        assert_eq!(transport.play_state(), PlayState::Playing);
        transport.pause();
        assert_eq!(transport.play_state(), PlayState::Paused);
        transport.play();
        assert_eq!(transport.play_state(), PlayState::Playing);
        transport.stop();
        assert_eq!(transport.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_stop_keeps_position() {
        let mut transport = song(60.0);
        transport.play();
        transport.advance(12.5);
        transport.stop();
        assert_eq!(transport.position(), 12.5);
    }

    #[test]
    fn test_seek_clamps() {
        let mut transport = song(60.0);
        assert_eq!(transport.seek(-4.0).unwrap(), 0.0);
        assert_eq!(transport.seek(75.0).unwrap(), 60.0);
        assert_eq!(transport.seek(30.0).unwrap(), 30.0);
        assert!(transport.seek(f64::NAN).is_err());
        assert_eq!(transport.position(), 30.0);
    }

    #[test]
    fn test_seek_wraps_into_loop() {
        let mut transport = song(60.0);
        transport.set_loop(10.0, 20.0, true).unwrap();
        assert_eq!(transport.seek(23.0).unwrap(), 13.0);
        assert_eq!(transport.seek(20.0).unwrap(), 10.0);
        assert_eq!(transport.seek(15.0).unwrap(), 15.0);
        let position = transport.seek(5.0).unwrap();
        assert!(position >= 10.0 && position < 20.0);
    }

    #[test]
    fn test_invalid_loop_regions() {
        let mut transport = song(60.0);
        for (start, end) in [(20.0, 10.0), (10.0, 10.0), (-1.0, 10.0), (10.0, 61.0)] {
            let result = transport.set_loop(start, end, true);
            assert!(matches!(result, Err(SyncError::InvalidLoopRegion { .. })));
        }
        // Rejected calls leave the loop untouched
        assert!(!transport.state().loop_enabled);
        assert_eq!(transport.state().loop_end, 60.0);
    }

    #[test]
    fn test_loop_wrap_scenario() {
        let mut transport = song(60.0);
        transport.set_loop(10.0, 20.0, true).unwrap();
        transport.seek(18.0).unwrap();
        transport.play();

        assert_eq!(transport.advance(5.0), AdvanceOutcome::Wrapped);
        assert_eq!(transport.position(), 13.0);
    }

    #[test]
    fn test_loop_wrap_stays_in_region() {
        let mut transport = song(60.0);
        transport.set_loop(10.0, 20.0, true).unwrap();
        transport.seek(10.0).unwrap();
        transport.play();

        // Cumulative advance passes the loop length many times over
        for step in [0.37, 3.3, 9.99, 10.0, 27.1, 0.001, 44.4] {
            for _ in 0..25 {
                transport.advance(step);
                let position = transport.position();
                assert!(position >= 10.0 && position < 20.0, "position {} escaped loop", position);
            }
        }
        assert!(transport.is_playing());
    }

    #[test]
    fn test_advance_scaled_by_tempo() {
        let mut transport = song(60.0);
        transport.set_tempo(180.0);
        transport.play();
        transport.advance(2.0);
        assert_eq!(transport.position(), 3.0);
    }

    #[test]
    fn test_advance_to_end_stops() {
        let mut transport = song(10.0);
        transport.seek(9.0).unwrap();
        transport.play();
        assert_eq!(transport.advance(5.0), AdvanceOutcome::Finished);
        assert_eq!(transport.position(), 10.0);
        assert_eq!(transport.play_state(), PlayState::Stopped);

        // Paused or stopped transports do not move
        assert_eq!(transport.advance(1.0), AdvanceOutcome::Idle);

        // Playing again from the end restarts
        transport.play();
        assert_eq!(transport.position(), 0.0);
    }

    #[test]
    fn test_reconcile_from_engine() {
        let mut transport = song(30.0);
        assert_eq!(transport.reconcile(5.0), AdvanceOutcome::Idle);

        transport.play();
        assert_eq!(transport.reconcile(7.25), AdvanceOutcome::Advanced);
        assert_eq!(transport.position(), 7.25);

        assert_eq!(transport.reconcile(31.0), AdvanceOutcome::Finished);
        assert_eq!(transport.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_set_tempo_rejects_non_positive() {
        let mut transport = song(60.0);
        transport.set_tempo(0.0);
        transport.set_tempo(-10.0);
        assert_eq!(transport.effective_tempo(), 120.0);
    }

    #[test]
    fn test_new_validates() {
        assert!(Transport::new(SongTransportState::new("a", 0.0, 60.0)).is_err());
        assert!(Transport::new(SongTransportState::new("a", 120.0, 0.0)).is_err());
        assert!(Transport::new(SongTransportState::new("a", 120.0, 60.0).with_volume(1.5)).is_err());

        let mut looped = SongTransportState::new("a", 120.0, 60.0);
        looped.loop_enabled = true;
        looped.loop_start = 30.0;
        looped.loop_end = 20.0;
        assert!(matches!(
            Transport::new(looped),
            Err(SyncError::InvalidLoopRegion { .. })
        ));
    }

    #[test]
    fn test_new_resets_disabled_loop_region() {
        let mut song = SongTransportState::new("a", 120.0, 60.0);
        song.loop_start = 0.0;
        song.loop_end = 0.0;
        let mut transport = Transport::new(song).unwrap();
        assert_eq!(transport.state().loop_start, 0.0);
        assert_eq!(transport.state().loop_end, 60.0);

        // Explicit loop changes are still checked
        assert!(transport.set_loop(0.0, 0.0, false).is_err());
        transport.set_loop(5.0, 15.0, true).unwrap();
        assert!(transport.state().loop_enabled);
    }

    #[test]
    fn test_audibility_rule() {
        let mut plain = SongTransportState::new("a", 120.0, 60.0);
        assert!(is_audible(&plain, false));
        assert!(!is_audible(&plain, true));

        plain.is_muted = true;
        assert!(!is_audible(&plain, false));

        plain.is_solo = true;
        assert!(is_audible(&plain, true));
    }
}
