//! Config Entry types
//!
//! A ConfigEntry represents a single instance of an integration's configuration.

use chrono::{DateTime, Utc};
use ha_core::ConfigData;
use serde::{Deserialize, Serialize};

use crate::state_machine::InvalidTransition;

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    /// Initial state, not yet set up
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    /// Setup failed; setup may be attempted again
    SetupError,
    UnloadInProgress,
    /// Unload failed (terminal)
    FailedUnload,
}

/// Source of the config entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Configured via UI/API
    #[default]
    User,
    /// Imported from YAML config
    Import,
    /// Found by an integration's discovery
    Discovery,
}

/// A configuration entry for an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (e.g., "emontx_config")
    pub domain: String,

    /// Human-readable display name
    pub title: String,

    /// Data written by the config flow
    #[serde(default)]
    pub data: ConfigData,

    /// Data written by the options flow
    #[serde(default)]
    pub options: ConfigData,

    #[serde(default = "default_version")]
    pub version: u32,

    /// Optional unique identifier for duplicate prevention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default)]
    pub source: ConfigEntrySource,

    /// Current lifecycle state (not persisted)
    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Human-readable explanation for failed states (not persisted)
    #[serde(skip, default)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    /// Create a new config entry
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: ConfigData::new(),
            options: ConfigData::new(),
            version: 1,
            unique_id: None,
            source: ConfigEntrySource::User,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(mut self, data: ConfigData) -> Self {
        self.data = data;
        self
    }

    pub fn with_options(mut self, options: ConfigData) -> Self {
        self.options = options;
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    /// Look up a string setting, preferring options over data
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(serde_json::Value::as_str)
            .or_else(|| self.data.get(key).and_then(serde_json::Value::as_str))
    }

    /// Validate and apply a state transition
    pub fn try_set_state(
        &mut self,
        new_state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state.try_transition(new_state)?;
        self.state = new_state;
        self.reason = reason;
        Ok(())
    }
}

/// Update data for a config entry
#[derive(Debug, Default)]
pub struct ConfigEntryUpdate {
    pub title: Option<String>,
    pub data: Option<ConfigData>,
    pub options: Option<ConfigData>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn data(mut self, data: ConfigData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn options(mut self, options: ConfigData) -> Self {
        self.options = Some(options);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_entry_new() {
        let entry = ConfigEntry::new("emontx_config", "emonTx Configuration");
        assert_eq!(entry.domain, "emontx_config");
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert_eq!(entry.version, 1);
        assert!(!entry.entry_id.is_empty());
    }

    #[test]
    fn test_setting_prefers_options() {
        let entry = ConfigEntry::new("emontx_config", "Test")
            .with_data(ConfigData::from([("esphome_device".to_string(), json!("livingroom"))]));
        assert_eq!(entry.setting_str("esphome_device"), Some("livingroom"));

        let entry =
            entry.with_options(ConfigData::from([("esphome_device".to_string(), json!("kitchen"))]));
        assert_eq!(entry.setting_str("esphome_device"), Some("kitchen"));
        assert_eq!(entry.setting_str("missing"), None);
    }

    #[test]
    fn test_non_string_option_falls_back_to_data() {
        let entry = ConfigEntry::new("emontx_config", "Test")
            .with_data(ConfigData::from([("esphome_device".to_string(), json!("livingroom"))]))
            .with_options(ConfigData::from([("esphome_device".to_string(), json!(null))]));
        assert_eq!(entry.setting_str("esphome_device"), Some("livingroom"));
    }

    #[test]
    fn test_runtime_state_not_persisted() {
        let mut entry = ConfigEntry::new("test", "Test Entry").with_unique_id("test-123");
        entry
            .try_set_state(ConfigEntryState::SetupInProgress, None)
            .unwrap();

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("state").is_none());

        let parsed: ConfigEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.state, ConfigEntryState::NotLoaded);
        assert_eq!(parsed.unique_id.as_deref(), Some("test-123"));
    }
}
