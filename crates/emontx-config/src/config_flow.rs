//! Setup and options flows

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::flow::{STEP_INIT, STEP_USER};
use ha_config_entries::{
    AbortFlow, ConfigEntry, ConfigFlow, FlowContext, FlowHandler, FlowStep, FormField,
    OptionsFlow, SelectOption, SelectSelectorConfig, SelectSelectorMode,
};
use ha_core::ConfigData;
use ha_service_registry::ServiceRegistry;
use tracing::debug;

use crate::constants::{CONF_ESPHOME_DEVICE, DOMAIN, ENTRY_TITLE};
use crate::discovery::esphome_devices;

/// Hands out the integration's flows
pub struct EmonTxFlowHandler {
    services: Arc<ServiceRegistry>,
}

impl EmonTxFlowHandler {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self { services }
    }
}

impl FlowHandler for EmonTxFlowHandler {
    fn create_flow(&self) -> Box<dyn ConfigFlow> {
        Box::new(EmonTxConfigFlow::new(self.services.clone()))
    }

    fn create_options_flow(&self, entry: &ConfigEntry) -> Option<Box<dyn OptionsFlow>> {
        Some(Box::new(EmonTxOptionsFlow::new(entry)))
    }
}

/// Picks the ESPHome device and creates the single entry
pub struct EmonTxConfigFlow {
    services: Arc<ServiceRegistry>,
}

impl EmonTxConfigFlow {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self { services }
    }

    fn device_form(&self) -> FlowStep {
        let options = esphome_devices(&self.services)
            .into_iter()
            .map(SelectOption::plain)
            .collect();

        let picker = FormField::select(
            CONF_ESPHOME_DEVICE,
            SelectSelectorConfig {
                options,
                mode: SelectSelectorMode::Dropdown,
                custom_value: true,
            },
        );
        FlowStep::form(STEP_USER, vec![picker])
    }
}

#[async_trait]
impl ConfigFlow for EmonTxConfigFlow {
    async fn step(
        &mut self,
        step_id: &str,
        ctx: &mut FlowContext,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, AbortFlow> {
        if step_id != STEP_USER {
            return Err(AbortFlow::new("unknown_step"));
        }

        let Some(input) = user_input else {
            return Ok(self.device_form());
        };

        ctx.set_unique_id(DOMAIN);
        ctx.abort_if_unique_id_configured()?;

        debug!(device = ?input.get(CONF_ESPHOME_DEVICE), "Creating emonTx entry");
        Ok(FlowStep::create_entry(ENTRY_TITLE, input))
    }
}

/// Changes the ESPHome device of an existing entry
pub struct EmonTxOptionsFlow {
    current_device: String,
}

impl EmonTxOptionsFlow {
    pub fn new(entry: &ConfigEntry) -> Self {
        Self {
            current_device: entry
                .setting_str(CONF_ESPHOME_DEVICE)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[async_trait]
impl OptionsFlow for EmonTxOptionsFlow {
    async fn step(
        &mut self,
        _step_id: &str,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, AbortFlow> {
        match user_input {
            // Written to the entry's options by the flow manager
            Some(input) => Ok(FlowStep::create_entry("", input)),
            None => Ok(FlowStep::form(
                STEP_INIT,
                vec![FormField::text(CONF_ESPHOME_DEVICE).with_default(self.current_device.clone())],
            )),
        }
    }
}
