//! Names shared across the integration

/// Integration domain; also the unique id of its single config entry
pub const DOMAIN: &str = "emontx_config";

/// Config entry key holding the ESPHome device name
pub const CONF_ESPHOME_DEVICE: &str = "esphome_device";

/// Domain the ESPHome bridge registers its services under
pub const ESPHOME_DOMAIN: &str = "esphome";

/// Event the bridge fires with raw emonTx payloads
pub const EVENT_EMONTX_DATA: &str = "esphome.emontx_raw";

pub const SERVICE_SEND_COMMAND: &str = "send_command";

/// Suffix of the bridge's per-device command services
pub const SEND_COMMAND_SUFFIX: &str = "_send_command";

/// Offered in the device picker when the bridge exposes no devices
pub const PLACEHOLDER_DEVICE: &str = "emontx_config";

pub const ENTRY_TITLE: &str = "emonTx Configuration";

pub const PANEL_COMPONENT: &str = "iframe";
pub const PANEL_TITLE: &str = "emonTx Config";
pub const PANEL_ICON: &str = "mdi:lightning-bolt";
pub const PANEL_URL_PATH: &str = "emontx-config";

/// URL prefix the frontend directory is served under
pub const STATIC_URL_PATH: &str = "/emontx_config_static";

/// Page the panel iframe loads, relative to the frontend directory
pub const PANEL_ASSET: &str = "panel.html";
