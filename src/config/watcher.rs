// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Hot reload of the session config file.
//!
//! The parent directory is watched so editors that save by replacing the
//! file are still seen. Bursts of writes are debounced into one reload.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use super::SessionConfig;

/// Events emitted by the config watcher
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Config file changed and parsed and validated cleanly
    Reloaded(Box<SessionConfig>),
    /// Config file changed but could not be used
    Error(String),
}

/// Watches one session config file
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    event_receiver: Receiver<ConfigEvent>,
    watched_path: PathBuf,
}

impl ConfigWatcher {
    /// Start watching `path`; `debounce_ms` defaults to 500
    pub fn new<P: AsRef<Path>>(path: P, debounce_ms: Option<u64>) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let directory = watched_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = watched_path
            .file_name()
            .ok_or_else(|| anyhow!("Config path has no file name: {:?}", watched_path))?
            .to_os_string();
        let debounce = Duration::from_millis(debounce_ms.unwrap_or(500));

        let (event_tx, event_rx) = mpsc::channel();
        let (notify_tx, notify_rx) = mpsc::channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow!("Failed to watch directory {:?}: {}", directory, e))?;

        let reload_path = watched_path.clone();
        std::thread::spawn(move || {
            let mut dirty_since: Option<Instant> = None;
            loop {
                match notify_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(event) => {
                        let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(file_name.as_os_str()));
                        if relevant {
                            dirty_since = Some(Instant::now());
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if dirty_since.is_some_and(|since| since.elapsed() >= debounce) {
                    dirty_since = None;
                    let event = match validate_config(&reload_path) {
                        Ok(config) => {
                            debug!(path = ?reload_path, "session config reloaded");
                            ConfigEvent::Reloaded(Box::new(config))
                        }
                        Err(e) => {
                            warn!(path = ?reload_path, error = %e, "session config reload failed");
                            ConfigEvent::Error(format!("{:#}", e))
                        }
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            event_receiver: event_rx,
            watched_path,
        })
    }

    /// Try to receive the next config event (non-blocking)
    pub fn try_recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Receive all pending config events
    pub fn recv_all(&self) -> Vec<ConfigEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ConfigEvent> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Get the path being watched
    pub fn watched_path(&self) -> &Path {
        &self.watched_path
    }
}

/// Load and validate a config file without applying it
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<SessionConfig> {
    let config = SessionConfig::load(path.as_ref())?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))?;
    Ok(config)
}
