//! Per-entry runtime state

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// What a loaded entry keeps in memory
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeState {
    pub esphome_device: String,
    /// Last raw payload reported by the bridge
    pub last_data: Option<Value>,
}

impl RuntimeState {
    pub fn new(esphome_device: impl Into<String>) -> Self {
        Self {
            esphome_device: esphome_device.into(),
            last_data: None,
        }
    }
}

/// Runtime state of every loaded entry, by entry id
#[derive(Debug, Default)]
pub struct DomainData {
    entries: DashMap<String, RuntimeState>,
}

impl DomainData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry_id: impl Into<String>, state: RuntimeState) {
        self.entries.insert(entry_id.into(), state);
    }

    pub fn remove(&self, entry_id: &str) -> Option<RuntimeState> {
        self.entries.remove(entry_id).map(|(_, state)| state)
    }

    pub fn get(&self, entry_id: &str) -> Option<RuntimeState> {
        self.entries.get(entry_id).map(|s| s.value().clone())
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.entries.contains_key(entry_id)
    }

    /// Replace the cached payload; false if the entry is not loaded
    pub fn set_last_data(&self, entry_id: &str, data: Value) -> bool {
        match self.entries.get_mut(entry_id) {
            Some(mut state) => {
                state.last_data = Some(data);
                true
            }
            None => false,
        }
    }

    /// Device of the loaded entry, used when a command names no device
    ///
    /// The integration allows a single entry; should there be more, the one
    /// with the lowest entry id wins.
    pub fn default_device(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by(|a, b| a.key().cmp(b.key()))
            .map(|s| s.esphome_device.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Thread-safe wrapper for DomainData
pub type SharedDomainData = Arc<DomainData>;
