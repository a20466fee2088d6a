//! Entry setup and unload

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntries, ConfigEntry, EntryHandler, FlowManager, HandlerResult, OnUnload};
use ha_core::Event;
use ha_event_bus::SharedEventBus;
use ha_frontend::SharedFrontend;
use ha_service_registry::SharedServiceRegistry;
use tracing::{debug, info, instrument};

use crate::config_flow::EmonTxFlowHandler;
use crate::constants::{CONF_ESPHOME_DEVICE, DOMAIN, EVENT_EMONTX_DATA, SERVICE_SEND_COMMAND};
use crate::panel::{register_panel, remove_panel};
use crate::runtime::{DomainData, RuntimeState, SharedDomainData};
use crate::services::register_send_command;
use crate::settings::EmonTxSettings;

/// The emonTx integration
pub struct EmonTx {
    bus: SharedEventBus,
    services: SharedServiceRegistry,
    frontend: SharedFrontend,
    data: SharedDomainData,
    settings: EmonTxSettings,
}

impl EmonTx {
    pub fn new(
        bus: SharedEventBus,
        services: SharedServiceRegistry,
        frontend: SharedFrontend,
        settings: EmonTxSettings,
    ) -> Self {
        Self {
            bus,
            services,
            frontend,
            data: Arc::new(DomainData::new()),
            settings,
        }
    }

    /// Runtime state of loaded entries
    pub fn data(&self) -> &SharedDomainData {
        &self.data
    }

    /// Install the config flow and the entry handler with the host
    pub fn register(self: Arc<Self>, entries: &ConfigEntries, flows: &FlowManager) {
        flows.register(DOMAIN, Arc::new(EmonTxFlowHandler::new(self.services.clone())));
        entries.register_handler(DOMAIN, self);
        debug!("emonTx integration registered");
    }
}

#[async_trait]
impl EntryHandler for EmonTx {
    #[instrument(skip_all, fields(entry_id = %entry.entry_id))]
    async fn setup_entry(&self, entry: &ConfigEntry, on_unload: &mut OnUnload) -> HandlerResult {
        let device = entry
            .setting_str(CONF_ESPHOME_DEVICE)
            .unwrap_or_default()
            .to_string();
        self.data
            .insert(entry.entry_id.clone(), RuntimeState::new(device.clone()));

        if let Err(err) = register_panel(&self.frontend, &self.settings.frontend_dir) {
            self.data.remove(&entry.entry_id);
            return Err(err.to_string());
        }

        let data = self.data.clone();
        let entry_id = entry.entry_id.clone();
        let listener = self.bus.listen(EVENT_EMONTX_DATA, move |event: &Event| {
            debug!(data = %event.data, "emonTx data received");
            data.set_last_data(&entry_id, event.data.clone());
        });
        on_unload.push(move || {
            listener.remove();
        });

        if !self.services.has_service(DOMAIN, SERVICE_SEND_COMMAND) {
            register_send_command(&self.services, self.data.clone());
        }

        info!(device = %device, "emonTx configuration set up");
        Ok(())
    }

    #[instrument(skip_all, fields(entry_id = %entry.entry_id))]
    async fn unload_entry(&self, entry: &ConfigEntry) -> HandlerResult {
        remove_panel(&self.frontend);
        self.data.remove(&entry.entry_id);
        info!("emonTx configuration unloaded");
        Ok(())
    }
}
