// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Preset repository interface.
//!
//! Stores hold encoded presets as opaque bytes keyed by name.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, SyncError};

/// External preset repository
pub trait PresetStore: Send + Sync {
    /// Store a preset, replacing any with the same name
    fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fetch a preset by name
    fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Names of every stored preset
    fn list(&self) -> Result<Vec<String>>;
}

/// In-process store, mostly for tests and the demo
#[derive(Debug, Default)]
pub struct MemoryPresetStore {
    presets: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn presets(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.presets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PresetStore for MemoryPresetStore {
    fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(SyncError::Store("preset name is empty".to_string()));
        }
        self.presets().insert(name.to_string(), bytes);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.presets()
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::Store(format!("no preset named {}", name)))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.presets().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_list() {
        let store = MemoryPresetStore::new();
        store.put("b", vec![2]).unwrap();
        store.put("a", vec![1]).unwrap();
        store.put("a", vec![3]).unwrap();

        assert_eq!(store.get("a").unwrap(), vec![3]);
        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_missing_and_empty_names() {
        let store = MemoryPresetStore::new();
        assert!(matches!(store.get("nope"), Err(SyncError::Store(_))));
        assert!(matches!(store.put("  ", vec![]), Err(SyncError::Store(_))));
    }
}
