//! Frontend panels and static paths
//!
//! Integrations register sidebar panels and directories of static assets
//! here. The server mounts [`Frontend::static_router`] so registered
//! directories are served under their URL prefix.

mod router;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Frontend registration errors
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("overwriting panel {0}")]
    PanelExists(String),

    #[error("invalid url path '{0}': must start with '/' and not be the root")]
    InvalidUrlPath(String),
}

/// A sidebar panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    /// Frontend component rendering the panel (e.g. "iframe")
    pub component_name: String,
    /// URL slug under which the panel is reachable
    pub url_path: String,
    #[serde(rename = "title")]
    pub sidebar_title: Option<String>,
    #[serde(rename = "icon")]
    pub sidebar_icon: Option<String>,
    /// Component-specific configuration
    pub config: Option<serde_json::Value>,
    pub require_admin: bool,
}

impl Panel {
    pub fn new(component_name: impl Into<String>, url_path: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            url_path: url_path.into(),
            sidebar_title: None,
            sidebar_icon: None,
            config: None,
            require_admin: false,
        }
    }

    /// Show the panel in the sidebar
    pub fn sidebar(mut self, title: impl Into<String>, icon: impl Into<String>) -> Self {
        self.sidebar_title = Some(title.into());
        self.sidebar_icon = Some(icon.into());
        self
    }

    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn require_admin(mut self, require_admin: bool) -> Self {
        self.require_admin = require_admin;
        self
    }
}

/// A directory served under a URL prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPath {
    pub url_path: String,
    pub path: PathBuf,
    /// Let clients cache responses; otherwise they must revalidate
    pub cache_headers: bool,
}

/// Registry of panels and static paths
#[derive(Default)]
pub struct Frontend {
    /// Panels by url path
    panels: DashMap<String, Panel>,
    /// Static paths by url prefix
    static_paths: DashMap<String, StaticPath>,
}

impl Frontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a directory under a URL prefix
    ///
    /// Registering the same prefix again replaces the previous mapping.
    pub fn register_static_path(
        &self,
        url_path: impl Into<String>,
        path: impl Into<PathBuf>,
        cache_headers: bool,
    ) -> Result<(), FrontendError> {
        let url_path = url_path.into();
        if !url_path.starts_with('/') || url_path == "/" {
            return Err(FrontendError::InvalidUrlPath(url_path));
        }

        let static_path = StaticPath {
            url_path: url_path.clone(),
            path: path.into(),
            cache_headers,
        };
        debug!(url_path = %url_path, path = ?static_path.path, "Registering static path");
        self.static_paths.insert(url_path, static_path);
        Ok(())
    }

    pub fn static_paths(&self) -> Vec<StaticPath> {
        let mut paths: Vec<_> = self.static_paths.iter().map(|p| p.value().clone()).collect();
        paths.sort_by(|a, b| a.url_path.cmp(&b.url_path));
        paths
    }

    /// Register a built-in panel
    ///
    /// A panel already registered under the same url path is not replaced.
    pub fn register_built_in_panel(&self, panel: Panel) -> Result<(), FrontendError> {
        match self.panels.entry(panel.url_path.clone()) {
            Entry::Occupied(existing) => Err(FrontendError::PanelExists(existing.key().clone())),
            Entry::Vacant(slot) => {
                info!(url_path = %panel.url_path, component = %panel.component_name, "Registering panel");
                slot.insert(panel);
                Ok(())
            }
        }
    }

    /// Remove a panel; false if none was registered under the url path
    pub fn remove_panel(&self, url_path: &str) -> bool {
        if self.panels.remove(url_path).is_some() {
            debug!(url_path = %url_path, "Removed panel");
            true
        } else {
            warn!("Removing unknown panel {}", url_path);
            false
        }
    }

    pub fn get_panel(&self, url_path: &str) -> Option<Panel> {
        self.panels.get(url_path).map(|p| p.value().clone())
    }

    /// All panels, sorted by url path
    pub fn panels(&self) -> Vec<Panel> {
        let mut panels: Vec<_> = self.panels.iter().map(|p| p.value().clone()).collect();
        panels.sort_by(|a, b| a.url_path.cmp(&b.url_path));
        panels
    }
}

/// Thread-safe wrapper for Frontend
pub type SharedFrontend = Arc<Frontend>;
