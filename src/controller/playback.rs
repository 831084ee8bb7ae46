// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Playback-mode policies.
//!
//! Decides which songs start on a master `play`, which song follows a
//! finished one, and when staggered cascade starts fall due. Each mode is
//! one arm of a match over the closed `PlaybackMode` enum.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::state::{PlaybackMode, SongId};

/// A song waiting for its cascade offset to elapse
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStart {
    /// Song to start
    pub song: SongId,
    /// Seconds of master play time left before it starts
    pub remaining: f64,
}

/// One song in playback order with its eligibility
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub song: SongId,
    pub eligible: bool,
}

impl Candidate {
    pub fn new(song: SongId, eligible: bool) -> Self {
        Self { song, eligible }
    }
}

/// Playback-mode scheduler state
#[derive(Debug)]
pub struct PlaybackScheduler {
    /// Song most recently started by round-robin or random mode
    current: Option<SongId>,
    /// Cascade starts not yet due
    pending: Vec<PendingStart>,
    /// Random source for random mode
    rng: StdRng,
}

impl PlaybackScheduler {
    /// Create a scheduler; a seed makes random mode reproducible
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            current: None,
            pending: Vec::new(),
            rng,
        }
    }

    /// Reseed the random source
    pub fn reseed(&mut self, seed: Option<u64>) {
        self.rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
    }

    /// Song currently owned by round-robin or random mode
    pub fn current(&self) -> Option<&SongId> {
        self.current.as_ref()
    }

    /// Cascade starts still waiting
    pub fn pending(&self) -> &[PendingStart] {
        &self.pending
    }

    /// Check if any cascade start is waiting
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Songs to start immediately on a master `play` from stopped
    pub fn start(&mut self, mode: PlaybackMode, candidates: &[Candidate], stagger_secs: f64) -> Vec<SongId> {
        self.pending.clear();
        let eligible: Vec<&SongId> = candidates
            .iter()
            .filter(|c| c.eligible)
            .map(|c| &c.song)
            .collect();

        match mode {
            PlaybackMode::Simultaneous => {
                self.current = None;
                eligible.into_iter().cloned().collect()
            }
            PlaybackMode::RoundRobin => {
                // An interrupted song resumes; otherwise the sequence moves on
                let resume = self
                    .current
                    .as_ref()
                    .filter(|current| eligible.contains(current))
                    .cloned();
                let next = resume.or_else(|| next_in_sequence(candidates, self.current.as_ref()));
                self.current = next.clone();
                next.into_iter().collect()
            }
            PlaybackMode::Random => {
                let next = eligible.choose(&mut self.rng).map(|song| (*song).clone());
                self.current = next.clone();
                next.into_iter().collect()
            }
            PlaybackMode::Cascade => {
                self.current = None;
                let stagger = stagger_secs.max(0.0);
                let mut now = Vec::new();
                for (index, song) in eligible.into_iter().enumerate() {
                    let offset = stagger * index as f64;
                    if offset <= 0.0 {
                        now.push(song.clone());
                    } else {
                        self.pending.push(PendingStart {
                            song: song.clone(),
                            remaining: offset,
                        });
                    }
                }
                now
            }
        }
    }

    /// Song to start after `finished` reached its end, if any
    pub fn on_finished(&mut self, mode: PlaybackMode, finished: &SongId, candidates: &[Candidate]) -> Option<SongId> {
        match mode {
            PlaybackMode::Simultaneous | PlaybackMode::Cascade => None,
            PlaybackMode::RoundRobin => {
                if self.current.as_ref() != Some(finished) {
                    return None;
                }
                let next = next_in_sequence(candidates, Some(finished));
                self.current = next.clone();
                next
            }
            PlaybackMode::Random => {
                if self.current.as_ref() != Some(finished) {
                    return None;
                }
                let eligible: Vec<&SongId> = candidates
                    .iter()
                    .filter(|c| c.eligible)
                    .map(|c| &c.song)
                    .collect();
                let next = eligible.choose(&mut self.rng).map(|song| (*song).clone());
                self.current = next.clone();
                next
            }
        }
    }

    /// Count down cascade starts and return those now due
    pub fn advance(&mut self, delta_seconds: f64) -> Vec<SongId> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let delta = delta_seconds.max(0.0);
        let mut due = Vec::new();
        self.pending.retain_mut(|start| {
            start.remaining -= delta;
            if start.remaining <= 0.0 {
                due.push(start.song.clone());
                false
            } else {
                true
            }
        });
        due
    }

    /// Forget a removed song
    pub fn forget(&mut self, song: &SongId) {
        self.pending.retain(|start| &start.song != song);
        if self.current.as_ref() == Some(song) {
            self.current = None;
        }
    }

    /// Drop pending cascade starts; the round-robin position is kept
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// First eligible song after `after` in playback order, wrapping around
fn next_in_sequence(candidates: &[Candidate], after: Option<&SongId>) -> Option<SongId> {
    if candidates.is_empty() {
        return None;
    }
    let start = after
        .and_then(|id| candidates.iter().position(|c| &c.song == id))
        .map(|index| index + 1)
        .unwrap_or(0);

    (0..candidates.len())
        .map(|offset| &candidates[(start + offset) % candidates.len()])
        .find(|c| c.eligible)
        .map(|c| c.song.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(entries: &[(&str, bool)]) -> Vec<Candidate> {
        entries.iter()
            .map(|(id, eligible)| Candidate::new(SongId::from(*id), *eligible))
            .collect()
    }

    fn ids(list: &[&str]) -> Vec<SongId> {
        list.iter().map(|id| SongId::from(*id)).collect()
    }

    #[test]
    fn test_simultaneous_starts_eligible() {
        let mut scheduler = PlaybackScheduler::new(Some(1));
        let songs = candidates(&[("a", true), ("b", false), ("c", true)]);
        let started = scheduler.start(PlaybackMode::Simultaneous, &songs, 4.0);
        assert_eq!(started, ids(&["a", "c"]));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_round_robin_sequence() {
        let mut scheduler = PlaybackScheduler::new(Some(1));
        let songs = candidates(&[("a", true), ("b", false), ("c", true)]);

        assert_eq!(scheduler.start(PlaybackMode::RoundRobin, &songs, 0.0), ids(&["a"]));
        let next = scheduler.on_finished(PlaybackMode::RoundRobin, &SongId::from("a"), &songs);
        assert_eq!(next, Some(SongId::from("c")));
        let next = scheduler.on_finished(PlaybackMode::RoundRobin, &SongId::from("c"), &songs);
        assert_eq!(next, Some(SongId::from("a")));

        // Songs it did not start do not advance the sequence
        assert_eq!(scheduler.on_finished(PlaybackMode::RoundRobin, &SongId::from("c"), &songs), None);
    }

    #[test]
    fn test_round_robin_resumes_interrupted_song() {
        let mut scheduler = PlaybackScheduler::new(None);
        let songs = candidates(&[("a", true), ("b", true), ("c", true)]);
        scheduler.start(PlaybackMode::RoundRobin, &songs, 0.0);
        scheduler.on_finished(PlaybackMode::RoundRobin, &SongId::from("a"), &songs);

        // b was started when a finished; a stop and play picks it up again
        assert_eq!(scheduler.start(PlaybackMode::RoundRobin, &songs, 0.0), ids(&["b"]));
        assert_eq!(scheduler.current(), Some(&SongId::from("b")));
    }

    #[test]
    fn test_round_robin_skips_ineligible_current() {
        let mut scheduler = PlaybackScheduler::new(None);
        let songs = candidates(&[("a", true), ("b", true), ("c", true)]);
        scheduler.start(PlaybackMode::RoundRobin, &songs, 0.0);

        // a was muted while stopped
        let songs = candidates(&[("a", false), ("b", true), ("c", true)]);
        assert_eq!(scheduler.start(PlaybackMode::RoundRobin, &songs, 0.0), ids(&["b"]));
    }

    #[test]
    fn test_random_picks_eligible() {
        let mut scheduler = PlaybackScheduler::new(Some(42));
        let songs = candidates(&[("a", false), ("b", true), ("c", true), ("d", false)]);
        for _ in 0..50 {
            let started = scheduler.start(PlaybackMode::Random, &songs, 0.0);
            assert_eq!(started.len(), 1);
            assert!(started[0] == SongId::from("b") || started[0] == SongId::from("c"));
        }
    }

    #[test]
    fn test_random_is_reproducible_with_seed() {
        let songs = candidates(&[("a", true), ("b", true), ("c", true), ("d", true)]);
        let mut first = PlaybackScheduler::new(Some(7));
        let mut second = PlaybackScheduler::new(Some(7));
        for _ in 0..10 {
            assert_eq!(
                first.start(PlaybackMode::Random, &songs, 0.0),
                second.start(PlaybackMode::Random, &songs, 0.0)
            );
        }
    }

    #[test]
    fn test_random_with_nothing_eligible() {
        let mut scheduler = PlaybackScheduler::new(Some(3));
        let songs = candidates(&[("a", false)]);
        assert!(scheduler.start(PlaybackMode::Random, &songs, 0.0).is_empty());
        assert_eq!(scheduler.current(), None);
    }

    #[test]
    fn test_cascade_staggers_starts() {
        let mut scheduler = PlaybackScheduler::new(None);
        let songs = candidates(&[("a", true), ("b", true), ("c", false), ("d", true)]);

        assert_eq!(scheduler.start(PlaybackMode::Cascade, &songs, 2.0), ids(&["a"]));
        assert_eq!(scheduler.pending().len(), 2);

        assert!(scheduler.advance(1.5).is_empty());
        assert_eq!(scheduler.advance(0.5), ids(&["b"]));
        assert_eq!(scheduler.advance(2.0), ids(&["d"]));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_cascade_without_stagger_starts_all() {
        let mut scheduler = PlaybackScheduler::new(None);
        let songs = candidates(&[("a", true), ("b", true)]);
        assert_eq!(scheduler.start(PlaybackMode::Cascade, &songs, 0.0), ids(&["a", "b"]));
    }

    #[test]
    fn test_clear_and_forget() {
        let mut scheduler = PlaybackScheduler::new(None);
        let songs = candidates(&[("a", true), ("b", true), ("c", true)]);
        scheduler.start(PlaybackMode::Cascade, &songs, 1.0);

        scheduler.forget(&SongId::from("b"));
        assert_eq!(scheduler.pending().len(), 1);

        scheduler.clear();
        assert!(scheduler.advance(10.0).is_empty());
    }
}
