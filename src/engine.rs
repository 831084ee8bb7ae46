// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! External audio engine interface.
//!
//! The coordinator never calls the engine while holding session state.
//! Commands are queued as `EngineCommand`s and forwarded by a dispatcher
//! task; position polling must return the last known value without
//! blocking.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::state::SongId;

/// A fire-and-forget request for the audio engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    SetTempo { song: SongId, tempo: f64 },
    SetVolume { song: SongId, volume: f64 },
    Seek { song: SongId, position: f64 },
    SetPlaying { song: SongId, playing: bool },
}

impl EngineCommand {
    /// Song the command targets
    pub fn song(&self) -> &SongId {
        match self {
            EngineCommand::SetTempo { song, .. }
            | EngineCommand::SetVolume { song, .. }
            | EngineCommand::Seek { song, .. }
            | EngineCommand::SetPlaying { song, .. } => song,
        }
    }
}

/// Audio engine driven by the coordinator
pub trait AudioEngine: Send + Sync {
    /// Set playback tempo for a song
    fn set_tempo(&self, song: &SongId, tempo: f64);

    /// Set output gain for a song (already includes master volume and mute/solo)
    fn set_volume(&self, song: &SongId, volume: f64);

    /// Move a song's playhead
    fn seek(&self, song: &SongId, position: f64);

    /// Start or halt a song's output
    fn set_playing(&self, song: &SongId, playing: bool);

    /// Last known playback position; must not block
    fn poll_position(&self, song: &SongId) -> Option<f64>;

    /// Apply a queued command
    fn apply(&self, command: &EngineCommand) {
        match command {
            EngineCommand::SetTempo { song, tempo } => self.set_tempo(song, *tempo),
            EngineCommand::SetVolume { song, volume } => self.set_volume(song, *volume),
            EngineCommand::Seek { song, position } => self.seek(song, *position),
            EngineCommand::SetPlaying { song, playing } => self.set_playing(song, *playing),
        }
    }
}

/// Engine that ignores every command
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEngine;

impl AudioEngine for NullEngine {
    fn set_tempo(&self, _song: &SongId, _tempo: f64) {}
    fn set_volume(&self, _song: &SongId, _volume: f64) {}
    fn seek(&self, _song: &SongId, _position: f64) {}
    fn set_playing(&self, _song: &SongId, _playing: bool) {}
    fn poll_position(&self, _song: &SongId) -> Option<f64> {
        None
    }
}

/// Forward queued commands to the engine until the queue closes
pub fn spawn_engine_dispatcher(
    engine: Arc<dyn AudioEngine>,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            engine.apply(&command);
        }
        debug!("engine command queue closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl AudioEngine for Recorder {
        fn set_tempo(&self, song: &SongId, tempo: f64) {
            self.seen.lock().unwrap().push(format!("tempo {} {}", song, tempo));
        }
        fn set_volume(&self, song: &SongId, volume: f64) {
            self.seen.lock().unwrap().push(format!("volume {} {}", song, volume));
        }
        fn seek(&self, song: &SongId, position: f64) {
            self.seen.lock().unwrap().push(format!("seek {} {}", song, position));
        }
        fn set_playing(&self, song: &SongId, playing: bool) {
            self.seen.lock().unwrap().push(format!("playing {} {}", song, playing));
        }
        fn poll_position(&self, _song: &SongId) -> Option<f64> {
            None
        }
    }

    #[test]
    fn test_apply_dispatches() {
        let engine = Recorder::default();
        let song = SongId::from("a");
        engine.apply(&EngineCommand::SetTempo { song: song.clone(), tempo: 90.0 });
        engine.apply(&EngineCommand::SetPlaying { song: song.clone(), playing: true });
        assert_eq!(
            *engine.seen.lock().unwrap(),
            vec!["tempo a 90".to_string(), "playing a true".to_string()]
        );
    }

    #[tokio::test]
    async fn test_dispatcher_forwards_in_order() {
        let engine = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_engine_dispatcher(engine.clone(), rx);

        let song = SongId::from("b");
        tx.send(EngineCommand::Seek { song: song.clone(), position: 12.0 }).unwrap();
        tx.send(EngineCommand::SetVolume { song: song.clone(), volume: 0.5 }).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            *engine.seen.lock().unwrap(),
            vec!["seek b 12".to_string(), "volume b 0.5".to_string()]
        );
    }
}
