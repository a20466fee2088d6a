//! Config Entries Manager
//!
//! Manages the lifecycle of configuration entries.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::handler::{EntryHandler, OnUnload};
use crate::state_machine::InvalidTransition;
use crate::storage::{Storage, StorageError, StorageFile, StorageResult};

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed: {0}")]
    UnloadFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

/// Config Entries Manager
///
/// Owns every entry, persists them, and drives setup/unload through the
/// [`EntryHandler`] registered for the entry's domain.
pub struct ConfigEntries {
    storage: Storage,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Serializes setup and unload
    setup_lock: Mutex<()>,

    /// Serializes writes of the storage file
    save_lock: Mutex<()>,

    handlers: DashMap<String, Arc<dyn EntryHandler>>,

    /// Unload callbacks of loaded entries
    on_unload: DashMap<String, OnUnload>,
}

impl ConfigEntries {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            save_lock: Mutex::new(()),
            handlers: DashMap::new(),
            on_unload: DashMap::new(),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self
            .storage
            .load::<ConfigEntriesData>(STORAGE_KEY, STORAGE_VERSION)
            .await?
        {
            info!(
                "Loading {} config entries from storage (v{})",
                storage_file.data.entries.len(),
                storage_file.version
            );

            for entry in storage_file.data.entries {
                self.index_entry(entry);
            }
        }
        Ok(())
    }

    /// Write every entry to storage
    ///
    /// Saves run one at a time and each writes the entries as they are
    /// when it starts, so the last save leaves the latest state on disk.
    pub async fn save(&self) -> StorageResult<()> {
        let _guard = self.save_lock.lock().await;
        let data = ConfigEntriesData {
            entries: self.entries.iter().map(|r| r.value().clone()).collect(),
        };

        self.storage
            .save(&StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION))
            .await?;
        debug!("Saved {} config entries to storage", self.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: ConfigEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.insert(
                (entry.domain.clone(), unique_id.clone()),
                entry.entry_id.clone(),
            );
        }
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }
        self.entries.remove(&entry.entry_id);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|r| r.domain == domain)
            .map(|r| r.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add a new config entry
    ///
    /// Rejects an entry whose `(domain, unique_id)` is already taken.
    ///
    /// The unique id is claimed before the entry is indexed, so only one of
    /// several concurrent adds with the same id can succeed. If saving
    /// fails the entry is dropped again.
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            match self
                .by_unique_id
                .entry((entry.domain.clone(), unique_id.clone()))
            {
                Entry::Occupied(_) => {
                    return Err(ConfigEntriesError::AlreadyExists {
                        domain: entry.domain.clone(),
                        unique_id: unique_id.clone(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry.entry_id.clone());
                }
            }
        }
        self.entries.insert(entry.entry_id.clone(), entry.clone());

        if let Err(err) = self.save().await {
            self.unindex_entry(&entry);
            return Err(err.into());
        }

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Update an existing entry
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let updated = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

            if let Some(title) = update.title {
                entry.title = title;
            }
            if let Some(data) = update.data {
                entry.data = data;
            }
            if let Some(options) = update.options {
                entry.options = options;
            }
            entry.modified_at = Utc::now();
            entry.clone()
        };

        self.save().await?;
        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Remove an entry, unloading it first if it is loaded
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_loaded() {
            self.unload(entry_id).await?;
        }

        self.unindex_entry(&entry);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    fn set_state(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(())
    }

    /// Register the setup/unload handler for a domain
    pub fn register_handler(&self, domain: &str, handler: Arc<dyn EntryHandler>) {
        self.handlers.insert(domain.to_string(), handler);
        debug!("Registered entry handler for domain: {}", domain);
    }

    fn handler(&self, domain: &str) -> Option<Arc<dyn EntryHandler>> {
        self.handlers.get(domain).map(|h| h.value().clone())
    }

    /// Set up an entry through its domain's handler
    ///
    /// Only entries that are not loaded (or whose setup failed) can be set
    /// up, so an integration never sees a second setup without an unload.
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        self.set_state(entry_id, ConfigEntryState::SetupInProgress, None)?;
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        let Some(handler) = self.handler(&entry.domain) else {
            debug!(
                "No entry handler for domain {}, marking as loaded",
                entry.domain
            );
            return self.set_state(entry_id, ConfigEntryState::Loaded, None);
        };

        let mut on_unload = OnUnload::new();
        match handler.setup_entry(&entry, &mut on_unload).await {
            Ok(()) => {
                self.on_unload.insert(entry_id.to_string(), on_unload);
                self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Err(reason) => {
                warn!("Setup failed for entry {}: {}", entry_id, reason);
                on_unload.run();
                self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    /// Unload an entry
    ///
    /// An entry that is not loaded is left as is (a failed setup moves
    /// back to NotLoaded).
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::Loaded => {}
            ConfigEntryState::NotLoaded => return Ok(()),
            ConfigEntryState::SetupError => {
                return self.set_state(entry_id, ConfigEntryState::NotLoaded, None)
            }
            _ => {
                return Err(InvalidTransition {
                    from: entry.state,
                    to: ConfigEntryState::UnloadInProgress,
                }
                .into())
            }
        }

        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let result = match self.handler(&entry.domain) {
            Some(handler) => handler.unload_entry(&entry).await,
            None => Ok(()),
        };

        // Released whether or not the handler unloaded cleanly
        if let Some((_, on_unload)) = self.on_unload.remove(entry_id) {
            on_unload.run();
        }

        match result {
            Ok(()) => {
                self.set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
                info!("Unloaded entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Err(reason) => {
                warn!("Unload failed for entry {}: {}", entry_id, reason);
                self.set_state(entry_id, ConfigEntryState::FailedUnload, Some(reason.clone()))?;
                Err(ConfigEntriesError::UnloadFailed(reason))
            }
        }
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set up every entry that is not loaded yet
    pub async fn setup_all(&self) -> Vec<ConfigEntriesResult<()>> {
        let mut results = Vec::new();
        for entry_id in self.entry_ids() {
            if self.get(&entry_id).is_some_and(|e| !e.is_loaded()) {
                results.push(self.setup(&entry_id).await);
            }
        }
        results
    }

    /// Unload every loaded entry
    pub async fn unload_all(&self) -> Vec<ConfigEntriesResult<()>> {
        let mut results = Vec::new();
        for entry_id in self.entry_ids() {
            if self.get(&entry_id).is_some_and(|e| e.is_loaded()) {
                results.push(self.unload(&entry_id).await);
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ConfigEntrySource;
    use crate::handler::HandlerResult;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn create_test_manager() -> (TempDir, ConfigEntries) {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigEntries::new(Storage::new(temp_dir.path()));
        (temp_dir, manager)
    }

    /// Records lifecycle calls; setup or unload fail when asked to
    #[derive(Default)]
    struct RecordingHandler {
        calls: Arc<StdMutex<Vec<String>>>,
        fail_setup: bool,
        fail_unload: bool,
    }

    #[async_trait]
    impl EntryHandler for RecordingHandler {
        async fn setup_entry(&self, entry: &ConfigEntry, on_unload: &mut OnUnload) -> HandlerResult {
            self.calls.lock().unwrap().push(format!("setup {}", entry.title));
            let calls = self.calls.clone();
            on_unload.push(move || calls.lock().unwrap().push("release".to_string()));
            if self.fail_setup {
                return Err("Connection failed".to_string());
            }
            Ok(())
        }

        async fn unload_entry(&self, entry: &ConfigEntry) -> HandlerResult {
            self.calls.lock().unwrap().push(format!("unload {}", entry.title));
            if self.fail_unload {
                return Err("Device busy".to_string());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_entry() {
        let (_dir, manager) = create_test_manager();

        let entry = ConfigEntry::new("emontx_config", "emonTx").with_unique_id("emontx_config");
        let added = manager.add(entry).await.unwrap();

        assert_eq!(added.domain, "emontx_config");
        assert_eq!(manager.len(), 1);
        assert!(manager
            .get_by_unique_id("emontx_config", "emontx_config")
            .is_some());
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_rejected() {
        let (_dir, manager) = create_test_manager();

        manager
            .add(ConfigEntry::new("hue", "Bridge 1").with_unique_id("same-id"))
            .await
            .unwrap();
        let result = manager
            .add(ConfigEntry::new("hue", "Bridge 2").with_unique_id("same-id"))
            .await;

        assert!(matches!(
            result,
            Err(ConfigEntriesError::AlreadyExists { .. })
        ));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_update_options_keeps_data() {
        let (_dir, manager) = create_test_manager();
        let data = ha_core::ConfigData::from([("host".to_string(), serde_json::json!("a"))]);
        let entry = manager
            .add(ConfigEntry::new("hue", "Hue").with_data(data.clone()))
            .await
            .unwrap();

        let options = ha_core::ConfigData::from([("host".to_string(), serde_json::json!("b"))]);
        let updated = manager
            .update(&entry.entry_id, ConfigEntryUpdate::new().options(options.clone()))
            .await
            .unwrap();

        assert_eq!(updated.data, data);
        assert_eq!(updated.options, options);
    }

    #[tokio::test]
    async fn test_setup_and_unload_run_handler() {
        let (_dir, manager) = create_test_manager();
        let handler = Arc::new(RecordingHandler::default());
        let calls = handler.calls.clone();
        manager.register_handler("hue", handler);

        let entry = manager.add(ConfigEntry::new("hue", "Test")).await.unwrap();
        assert_ok!(manager.setup(&entry.entry_id).await);
        assert!(manager.get(&entry.entry_id).unwrap().is_loaded());

        assert_ok!(manager.unload(&entry.entry_id).await);
        assert_eq!(
            manager.get(&entry.entry_id).unwrap().state,
            ConfigEntryState::NotLoaded
        );
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["setup Test", "unload Test", "release"]
        );
    }

    #[tokio::test]
    async fn test_second_setup_rejected_while_loaded() {
        let (_dir, manager) = create_test_manager();
        manager.register_handler("hue", Arc::new(RecordingHandler::default()));

        let entry = manager.add(ConfigEntry::new("hue", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();

        let result = manager.setup(&entry.entry_id).await;
        assert!(matches!(result, Err(ConfigEntriesError::InvalidState(_))));
        assert!(manager.get(&entry.entry_id).unwrap().is_loaded());
    }

    #[tokio::test]
    async fn test_setup_failure_releases_callbacks() {
        let (_dir, manager) = create_test_manager();
        let handler = Arc::new(RecordingHandler {
            fail_setup: true,
            ..Default::default()
        });
        let calls = handler.calls.clone();
        manager.register_handler("hue", handler);

        let entry = manager.add(ConfigEntry::new("hue", "Test")).await.unwrap();
        let result = manager.setup(&entry.entry_id).await;

        assert!(matches!(result, Err(ConfigEntriesError::SetupFailed(_))));
        let stored = manager.get(&entry.entry_id).unwrap();
        assert_eq!(stored.state, ConfigEntryState::SetupError);
        assert_eq!(stored.reason.as_deref(), Some("Connection failed"));
        assert_eq!(*calls.lock().unwrap(), vec!["setup Test", "release"]);
    }

    #[tokio::test]
    async fn test_remove_unloads_first() {
        let (_dir, manager) = create_test_manager();
        let handler = Arc::new(RecordingHandler::default());
        let calls = handler.calls.clone();
        manager.register_handler("hue", handler);

        let entry = manager
            .add(ConfigEntry::new("hue", "Test").with_unique_id("bridge"))
            .await
            .unwrap();
        manager.setup(&entry.entry_id).await.unwrap();
        manager.remove(&entry.entry_id).await.unwrap();

        assert!(manager.is_empty());
        assert!(manager.get_by_unique_id("hue", "bridge").is_none());
        assert!(calls.lock().unwrap().contains(&"unload Test".to_string()));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();

        {
            let manager = ConfigEntries::new(Storage::new(temp_dir.path()));
            manager
                .add(
                    ConfigEntry::new("hue", "Test")
                        .with_unique_id("test-123")
                        .with_source(ConfigEntrySource::Import),
                )
                .await
                .unwrap();
        }

        let manager = ConfigEntries::new(Storage::new(temp_dir.path()));
        manager.load().await.unwrap();

        assert_eq!(manager.len(), 1);
        let entry = manager.get_by_unique_id("hue", "test-123").unwrap();
        assert_eq!(entry.title, "Test");
        assert_eq!(entry.source, ConfigEntrySource::Import);
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
    }

    #[tokio::test]
    async fn test_failed_unload_still_releases_callbacks() {
        let (_dir, manager) = create_test_manager();
        let handler = Arc::new(RecordingHandler {
            fail_unload: true,
            ..Default::default()
        });
        let calls = handler.calls.clone();
        manager.register_handler("hue", handler);

        let entry = manager.add(ConfigEntry::new("hue", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();

        let result = manager.unload(&entry.entry_id).await;
        assert!(matches!(result, Err(ConfigEntriesError::UnloadFailed(_))));
        assert_eq!(
            manager.get(&entry.entry_id).unwrap().state,
            ConfigEntryState::FailedUnload
        );
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["setup Test", "unload Test", "release"]
        );
        assert!(manager.on_unload.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_keep_unique_id_single() {
        for _ in 0..20 {
            let temp_dir = TempDir::new().unwrap();
            let manager = Arc::new(ConfigEntries::new(Storage::new(temp_dir.path())));
            let barrier = Arc::new(tokio::sync::Barrier::new(8));

            let tasks: Vec<_> = (0..8)
                .map(|n| {
                    let manager = manager.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        manager
                            .add(
                                ConfigEntry::new("emontx_config", format!("emonTx {}", n))
                                    .with_unique_id("emontx_config"),
                            )
                            .await
                            .is_ok()
                    })
                })
                .collect();

            let mut accepted = 0;
            for task in tasks {
                if task.await.unwrap() {
                    accepted += 1;
                }
            }

            assert_eq!(accepted, 1);
            assert_eq!(manager.len(), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_persist_latest_state() {
        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(ConfigEntries::new(Storage::new(temp_dir.path())));

        let tasks: Vec<_> = (0..16)
            .map(|n| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .add(ConfigEntry::new("hue", format!("Bridge {}", n)))
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_ok!(task.await.unwrap());
        }

        let reloaded = ConfigEntries::new(Storage::new(temp_dir.path()));
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len(), 16);
    }

    #[tokio::test]
    async fn test_add_rolled_back_when_save_fails() {
        let temp_dir = TempDir::new().unwrap();
        // A file where the storage directory should be makes every save fail
        std::fs::write(temp_dir.path().join(".storage"), "").unwrap();
        let manager = ConfigEntries::new(Storage::new(temp_dir.path()));

        let result = manager
            .add(ConfigEntry::new("hue", "Test").with_unique_id("bridge"))
            .await;

        assert!(matches!(result, Err(ConfigEntriesError::Storage(_))));
        assert!(manager.is_empty());
        assert!(manager.get_by_unique_id("hue", "bridge").is_none());
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_manager_is_shareable_across_tasks() {
        assert_send_sync::<ConfigEntries>();
        assert_send_sync::<crate::flow::FlowContext>();
        assert_send_sync::<crate::flow::FlowManager>();
    }
}
