//! Integration settings from the host configuration

use std::path::PathBuf;

use serde::Deserialize;

/// `emontx_config:` section of `configuration.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmonTxSettings {
    /// Directory holding the panel assets
    pub frontend_dir: PathBuf,
}

impl Default for EmonTxSettings {
    fn default() -> Self {
        Self {
            frontend_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/frontend")),
        }
    }
}
