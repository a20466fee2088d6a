//! emonTx configuration integration
//!
//! Adds a sidebar panel for configuring an emonTx energy monitor that is
//! bridged through ESPHome, caches the last raw payload the bridge reports,
//! and relays commands to the bridge's per-device `send_command` service.
//!
//! The integration is registered with the host through [`EmonTx::register`],
//! which installs both the config flow and the entry setup/unload handler.

pub mod config_flow;
pub mod constants;
pub mod discovery;
pub mod integration;
pub mod panel;
pub mod runtime;
pub mod services;
pub mod settings;

pub use config_flow::{EmonTxConfigFlow, EmonTxFlowHandler, EmonTxOptionsFlow};
pub use constants::DOMAIN;
pub use discovery::{discover_devices, esphome_devices};
pub use integration::EmonTx;
pub use runtime::{DomainData, RuntimeState, SharedDomainData};
pub use services::{send_command, SendCommandRequest};
pub use settings::EmonTxSettings;
