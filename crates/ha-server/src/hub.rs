//! The central Home Assistant instance

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use emontx_config::{EmonTx, EmonTxSettings};
use ha_config_entries::{ConfigEntries, FlowManager, Storage};
use ha_event_bus::{EventBus, SharedEventBus};
use ha_frontend::{Frontend, SharedFrontend};
use ha_service_registry::{ServiceRegistry, SharedServiceRegistry};
use tracing::{info, warn};

pub struct HomeAssistant {
    /// Event bus for pub/sub communication
    pub bus: SharedEventBus,
    /// Service registry for service calls
    pub services: SharedServiceRegistry,
    /// Sidebar panels and static paths
    pub frontend: SharedFrontend,
    pub config_entries: Arc<ConfigEntries>,
    pub flows: Arc<FlowManager>,
}

impl HomeAssistant {
    pub fn new(config_dir: &Path) -> Self {
        let config_entries = Arc::new(ConfigEntries::new(Storage::new(config_dir)));
        let flows = Arc::new(FlowManager::new(config_entries.clone()));

        Self {
            bus: Arc::new(EventBus::new()),
            services: Arc::new(ServiceRegistry::new()),
            frontend: Arc::new(Frontend::new()),
            config_entries,
            flows,
        }
    }

    /// Load stored entries, register integrations and set entries up
    pub async fn start(&self, emontx_settings: EmonTxSettings) -> Result<()> {
        self.config_entries.load().await?;

        let emontx = Arc::new(EmonTx::new(
            self.bus.clone(),
            self.services.clone(),
            self.frontend.clone(),
            emontx_settings,
        ));
        emontx.register(&self.config_entries, &self.flows);

        for result in self.config_entries.setup_all().await {
            if let Err(err) = result {
                warn!("Config entry setup failed: {}", err);
            }
        }

        info!(entries = self.config_entries.len(), "Home Assistant started");
        Ok(())
    }

    /// Unload every loaded entry
    pub async fn stop(&self) {
        for result in self.config_entries.unload_all().await {
            if let Err(err) = result {
                warn!("Config entry unload failed: {}", err);
            }
        }
        info!("Home Assistant stopped");
    }
}
