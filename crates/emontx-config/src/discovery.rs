//! ESPHome device discovery
//!
//! The bridge registers one `<device>_send_command` service per device, so
//! the device list is read straight off the service registry.

use std::collections::BTreeSet;

use ha_service_registry::ServiceRegistry;
use tracing::debug;

use crate::constants::{ESPHOME_DOMAIN, PLACEHOLDER_DEVICE, SEND_COMMAND_SUFFIX};

/// Device names behind a set of ESPHome service names
///
/// Sorted and de-duplicated. Falls back to the placeholder device when no
/// command service is present so the picker is never empty.
pub fn discover_devices<I, S>(service_names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let devices: BTreeSet<String> = service_names
        .into_iter()
        .filter_map(|name| {
            name.as_ref()
                .strip_suffix(SEND_COMMAND_SUFFIX)
                .filter(|device| !device.is_empty())
                .map(str::to_string)
        })
        .collect();

    if devices.is_empty() {
        return vec![PLACEHOLDER_DEVICE.to_string()];
    }
    devices.into_iter().collect()
}

/// Devices currently exposed by the ESPHome bridge
pub fn esphome_devices(services: &ServiceRegistry) -> Vec<String> {
    let devices = discover_devices(services.domain_service_names(ESPHOME_DOMAIN));
    debug!(?devices, "Discovered ESPHome devices");
    devices
}
