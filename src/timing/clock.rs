// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Position clock and tap tempo.
//!
//! The position clock measures wall-clock time between ticks so song
//! positions stay correct under scheduling jitter. It is the only
//! component that runs unattended on a timer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default tick rate in Hz
pub const DEFAULT_TICK_RATE_HZ: f64 = 60.0;

/// Position clock state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
}

/// Where playing songs get their position from on each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// Integrate tempo-scaled wall-clock deltas
    #[default]
    Integrate,
    /// Overwrite positions from the audio engine's last reported value
    Engine,
}

/// Fixed-rate driver producing elapsed-time deltas
#[derive(Debug)]
pub struct PositionClock {
    /// Ticks per second
    tick_rate_hz: f64,
    /// Current state
    state: ClockState,
    /// Time of the previous tick
    last_tick: Option<Instant>,
    /// Number of ticks delivered since start
    ticks: u64,
}

impl PositionClock {
    /// Create a stopped clock at the given rate
    pub fn new(tick_rate_hz: f64) -> Self {
        let tick_rate_hz = if tick_rate_hz.is_finite() && tick_rate_hz > 0.0 {
            tick_rate_hz.min(1000.0)
        } else {
            DEFAULT_TICK_RATE_HZ
        };
        Self {
            tick_rate_hz,
            state: ClockState::Stopped,
            last_tick: None,
            ticks: 0,
        }
    }

    /// Get the tick rate
    pub fn tick_rate_hz(&self) -> f64 {
        self.tick_rate_hz
    }

    /// Get the clock state
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Number of ticks since start
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Nominal interval between ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz)
    }

    /// Start measuring from `now`
    pub fn start(&mut self, now: Instant) {
        self.state = ClockState::Running;
        self.last_tick = Some(now);
        self.ticks = 0;
    }

    /// Stop the clock
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
        self.last_tick = None;
    }

    /// Register a tick at `now` and return seconds elapsed since the last one
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        if self.state != ClockState::Running {
            return None;
        }
        let last = self.last_tick.replace(now)?;
        self.ticks += 1;
        Some(now.saturating_duration_since(last).as_secs_f64())
    }
}

impl Default for PositionClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE_HZ)
    }
}

/// Tap tempo calculator
#[derive(Debug, Clone)]
pub struct TapTempo {
    /// Recent tap times
    taps: VecDeque<Instant>,
    /// Maximum number of taps to average
    max_taps: usize,
    /// Maximum time between taps before resetting
    timeout: Duration,
}

impl TapTempo {
    /// Create a new tap tempo calculator
    pub fn new(max_taps: usize, timeout_ms: u64) -> Self {
        Self {
            taps: VecDeque::with_capacity(max_taps),
            max_taps: max_taps.max(2),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Record a tap at `now` and return the tempo once two taps are in
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        if let Some(last) = self.taps.back() {
            if now.saturating_duration_since(*last) > self.timeout {
                self.taps.clear();
            }
        }

        self.taps.push_back(now);
        if self.taps.len() > self.max_taps {
            self.taps.pop_front();
        }

        let first = *self.taps.front()?;
        let last = *self.taps.back()?;
        let intervals = self.taps.len().checked_sub(1).filter(|n| *n > 0)?;

        let span = last.saturating_duration_since(first).as_secs_f64();
        if span <= 0.0 {
            return None;
        }
        let bpm = 60.0 * intervals as f64 / span;
        Some(bpm.clamp(20.0, 300.0))
    }

    /// Forget all taps
    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(4, 2000) // Average 4 taps, 2 second timeout
    }
}
