// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo transitions.
//!
//! A transition carries its own start value, target and elapsed time and is
//! advanced only by clock ticks, so it can never race the position tick.

use serde::{Deserialize, Serialize};

/// Interpolation curve for tempo transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCurve {
    /// Constant rate of change
    #[default]
    Linear,
    /// Smoothstep: slow start, slow finish
    EaseInOut,
}

impl TransitionCurve {
    /// Map linear progress (0.0 - 1.0) onto the curve
    pub fn apply(&self, progress: f64) -> f64 {
        let t = progress.clamp(0.0, 1.0);
        match self {
            TransitionCurve::Linear => t,
            TransitionCurve::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// An in-flight tempo change for one song
#[derive(Debug, Clone, PartialEq)]
pub struct TempoTransition {
    /// Starting tempo
    from_tempo: f64,
    /// Target tempo
    to_tempo: f64,
    /// Total length in seconds
    duration: f64,
    /// Seconds elapsed so far
    elapsed: f64,
    /// Interpolation curve
    curve: TransitionCurve,
}

impl TempoTransition {
    /// Create a transition starting now
    pub fn new(from_tempo: f64, to_tempo: f64, duration: f64, curve: TransitionCurve) -> Self {
        Self {
            from_tempo,
            to_tempo,
            duration: duration.max(0.0),
            elapsed: 0.0,
            curve,
        }
    }

    /// Target tempo
    pub fn target(&self) -> f64 {
        self.to_tempo
    }

    /// Tempo at the current elapsed time
    pub fn current_tempo(&self) -> f64 {
        if self.is_complete() {
            return self.to_tempo;
        }
        let progress = self.curve.apply(self.elapsed / self.duration);
        self.from_tempo + (self.to_tempo - self.from_tempo) * progress
    }

    /// Advance by `delta_seconds` and return the new tempo
    pub fn advance(&mut self, delta_seconds: f64) -> f64 {
        self.elapsed += delta_seconds.max(0.0);
        self.current_tempo()
    }

    /// Check if the transition has reached its target
    pub fn is_complete(&self) -> bool {
        self.duration <= 0.0 || self.elapsed >= self.duration
    }
}
