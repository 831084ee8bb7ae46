// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, Level};

use walkway::config::{validate_config, ConfigEvent, ConfigWatcher, SessionConfig};
use walkway::{
    AudioEngine, MasterController, MultiSongPreset, PlaybackMode, Session, SessionEvent, SongId,
    SongTransportState, SyncMode,
};

fn print_usage() {
    println!("Walkway - Multi-song sync and transport coordinator");
    println!();
    println!("Usage: walkway [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --demo [SECS] [CONFIG]  Run a demo session for SECS seconds (default 8)");
    println!("  --check-preset <FILE>   Validate a preset JSON file");
    println!("  --check-config <FILE>   Validate a session config YAML file");
    println!("  --verbose               Log at debug level");
    println!("  --help                  Show this help message");
}

/// Engine stand-in that logs every call
struct LoggingEngine;

impl AudioEngine for LoggingEngine {
    fn set_tempo(&self, song: &SongId, tempo: f64) {
        debug!(%song, tempo, "engine set_tempo");
    }

    fn set_volume(&self, song: &SongId, volume: f64) {
        debug!(%song, volume, "engine set_volume");
    }

    fn seek(&self, song: &SongId, position: f64) {
        debug!(%song, position, "engine seek");
    }

    fn set_playing(&self, song: &SongId, playing: bool) {
        debug!(%song, playing, "engine set_playing");
    }

    fn poll_position(&self, _song: &SongId) -> Option<f64> {
        None
    }
}

async fn run_demo(seconds: f64, config_path: Option<String>) -> Result<()> {
    let config = match &config_path {
        Some(path) => validate_config(path)?,
        None => SessionConfig::default(),
    };

    let mut controller = MasterController::new(&config.master_state(), config.controller_options())?;
    for (id, tempo, duration) in [("intro-pad", 120.0, 64.0), ("bassline", 90.0, 48.0), ("drums", 140.0, 32.0)] {
        controller.add_song(SongTransportState::new(id, tempo, duration))?;
    }
    controller.set_loop(&SongId::from("drums"), 8.0, 16.0, true)?;

    let (session, _dispatcher) = Session::with_engine(controller, Arc::new(LoggingEngine));
    let clock = session.spawn_clock(config.position_clock());

    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        let mut ticks = 0u64;
        loop {
            match events.recv().await {
                Ok(SessionEvent::StateChanged(state)) => {
                    let playing: Vec<&str> = state
                        .songs
                        .iter()
                        .filter(|s| s.is_playing())
                        .map(|s| s.id.as_str())
                        .collect();
                    println!(
                        "state: master {:.1} BPM, {:?}, playing {:?}",
                        state.master.master_tempo, state.master.sync_mode, playing
                    );
                }
                Ok(SessionEvent::Tick(_)) => ticks += 1,
                Ok(SessionEvent::Warning(warning)) => println!("warning: {}", warning),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        ticks
    });

    let watcher = match &config_path {
        Some(path) => Some(ConfigWatcher::new(path, None)?),
        None => None,
    };

    println!("Running demo for {:.1}s...", seconds);
    session.set_sync_mode(SyncMode::Ratio)?;
    session.play()?;

    let step = Duration::from_secs_f64((seconds / 4.0).max(0.05));
    for tempo in [150.0, 100.0, 120.0] {
        tokio::time::sleep(step).await;
        session.set_master_tempo(tempo)?;
        if let Some(watcher) = &watcher {
            for event in watcher.recv_all() {
                match event {
                    ConfigEvent::Reloaded(config) => session.apply_config(&config),
                    ConfigEvent::Error(message) => println!("config error: {}", message),
                }
            }
        }
    }
    session.set_playback_mode(PlaybackMode::RoundRobin)?;
    tokio::time::sleep(step).await;
    session.stop()?;
    clock.abort();

    let state = session.snapshot();
    for song in &state.songs {
        println!(
            "{:<10} tempo {:>6.1} (orig {:>5.1})  position {:>6.2}/{:.0}s",
            song.id.as_str(),
            song.effective_tempo,
            song.original_tempo,
            song.position,
            song.duration
        );
    }

    drop(session);
    let ticks = printer.await.context("Event printer failed")?;
    println!("Demo complete! {} ticks observed", ticks);
    Ok(())
}

fn check_preset(path: &str) -> Result<()> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read preset file: {}", path))?;
    let preset = MultiSongPreset::from_json(&json)?;
    let warnings = preset.validate()?;

    println!("Preset \"{}\" (version {}, created {})", preset.name, preset.version, preset.created_at);
    println!(
        "  master {:.1} BPM, volume {:.2}, sync {:?}, playback {:?}",
        preset.master.master_tempo, preset.master.master_volume, preset.master.sync_mode, preset.master.playback_mode
    );
    for song in &preset.songs {
        println!("  {} ({:.1} BPM, volume {:.2})", song.id, song.original_tempo, song.volume);
    }
    for warning in warnings {
        println!("warning: {}", warning);
    }
    println!("Preset OK");
    Ok(())
}

fn check_config(path: &str) -> Result<()> {
    let config = validate_config(path)?;
    print!("{}", config.to_yaml()?);
    println!("Config OK");
    Ok(())
}

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    args.retain(|a| a != "--verbose");

    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if args.len() < 2 {
        println!("Walkway - Multi-song sync and transport coordinator");
        println!("Run with --help for usage information");
        return Ok(());
    }

    match args[1].as_str() {
        "--demo" => {
            let seconds: f64 = match args.get(2) {
                Some(arg) => arg
                    .parse()
                    .map_err(|_| anyhow!("Invalid duration in seconds: {}", arg))?,
                None => 8.0,
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(run_demo(seconds, args.get(3).cloned()))?;
        }
        "--check-preset" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: walkway --check-preset <FILE>");
                return Ok(());
            };
            check_preset(path)?;
        }
        "--check-config" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: walkway --check-config <FILE>");
                return Ok(());
            };
            check_config(path)?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}
