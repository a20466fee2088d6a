//! The `send_command` relay service

use std::sync::{Arc, Weak};

use ha_core::{Context, ServiceCall};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry, ServiceResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::constants::{DOMAIN, ESPHOME_DOMAIN, SEND_COMMAND_SUFFIX, SERVICE_SEND_COMMAND};
use crate::runtime::DomainData;

/// Data accepted by `emontx_config.send_command`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendCommandRequest {
    pub command: String,
    /// ESPHome device to target instead of the configured one
    #[serde(default)]
    pub device: Option<String>,
}

/// Forward a command to the bridge's `<device>_send_command` service
///
/// Without a usable device the command is dropped with an error log and
/// the call still succeeds. Bridge failures are returned as is.
pub async fn send_command(
    services: &ServiceRegistry,
    data: &DomainData,
    request: SendCommandRequest,
    context: Context,
) -> ServiceResult {
    let device = match request.device {
        Some(device) => device,
        None => data.default_device().unwrap_or_default(),
    };

    if device.is_empty() {
        error!("No ESPHome device configured for emonTx, dropping command");
        return Ok(());
    }

    let service = format!("{}{}", device, SEND_COMMAND_SUFFIX);
    debug!(device = %device, command = %request.command, "Relaying command");
    services
        .call(
            ESPHOME_DOMAIN,
            &service,
            json!({ "command": request.command }),
            context,
            true,
        )
        .await
}

/// Register `emontx_config.send_command`
///
/// The handler only holds a weak reference to the registry it lives in.
pub fn register_send_command(services: &Arc<ServiceRegistry>, data: Arc<DomainData>) {
    let registry = Arc::downgrade(services);

    services.register_with_description(
        ServiceDescription {
            domain: DOMAIN.to_string(),
            service: SERVICE_SEND_COMMAND.to_string(),
            name: Some("Send command".to_string()),
            description: Some("Send a command to the emonTx through ESPHome".to_string()),
        },
        move |call: ServiceCall| {
            let registry: Weak<ServiceRegistry> = registry.clone();
            let data = data.clone();
            async move {
                let request = call
                    .parse::<SendCommandRequest>()
                    .map_err(|e| ServiceError::InvalidData(e.to_string()))?;
                let services = registry
                    .upgrade()
                    .ok_or_else(|| ServiceError::CallFailed("service registry is gone".to_string()))?;
                send_command(&services, &data, request, call.context).await
            }
        },
    );

    info!("emonTx send_command service registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeState;
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    /// Records the data of every call to `esphome.<device>_send_command`
    fn mock_bridge(services: &ServiceRegistry, device: &str) -> Arc<Mutex<Vec<Value>>> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        services.register(
            ESPHOME_DOMAIN,
            format!("{}{}", device, SEND_COMMAND_SUFFIX),
            move |call: ServiceCall| {
                recorded.lock().unwrap().push(call.service_data);
                async { Ok(()) }
            },
        );
        calls
    }

    fn loaded(device: &str) -> Arc<DomainData> {
        let data = Arc::new(DomainData::new());
        data.insert("entry1", RuntimeState::new(device));
        data
    }

    #[test]
    fn test_request_parsing() {
        let request: SendCommandRequest =
            serde_json::from_value(json!({"command": "reset"})).unwrap();
        assert_eq!(request.device, None);

        assert!(serde_json::from_value::<SendCommandRequest>(json!({})).is_err());
        assert!(
            serde_json::from_value::<SendCommandRequest>(json!({"command": 1})).is_err()
        );
        assert!(serde_json::from_value::<SendCommandRequest>(
            json!({"command": "reset", "target": "x"})
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_relays_to_configured_device() {
        let services = Arc::new(ServiceRegistry::new());
        let calls = mock_bridge(&services, "livingroom");
        register_send_command(&services, loaded("livingroom"));

        assert_ok!(
            services
                .call(DOMAIN, SERVICE_SEND_COMMAND, json!({"command": "reset"}), Context::new(), true)
                .await
        );

        assert_eq!(*calls.lock().unwrap(), vec![json!({"command": "reset"})]);
    }

    #[tokio::test]
    async fn test_explicit_device_wins() {
        let services = Arc::new(ServiceRegistry::new());
        let livingroom = mock_bridge(&services, "livingroom");
        let kitchen = mock_bridge(&services, "kitchen");
        register_send_command(&services, loaded("livingroom"));

        assert_ok!(
            services
                .call(
                    DOMAIN,
                    SERVICE_SEND_COMMAND,
                    json!({"command": "list", "device": "kitchen"}),
                    Context::new(),
                    true,
                )
                .await
        );

        assert!(livingroom.lock().unwrap().is_empty());
        assert_eq!(kitchen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_device_drops_command() {
        let services = Arc::new(ServiceRegistry::new());
        let calls = mock_bridge(&services, "livingroom");
        register_send_command(&services, Arc::new(DomainData::new()));

        assert_ok!(
            services
                .call(DOMAIN, SERVICE_SEND_COMMAND, json!({"command": "reset"}), Context::new(), true)
                .await
        );
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_device_override_drops_command() {
        let services = ServiceRegistry::new();
        let calls = mock_bridge(&services, "livingroom");
        let request = SendCommandRequest {
            command: "reset".to_string(),
            device: Some(String::new()),
        };

        assert_ok!(send_command(&services, &loaded("livingroom"), request, Context::new()).await);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_request_is_invalid_data() {
        let services = Arc::new(ServiceRegistry::new());
        register_send_command(&services, loaded("livingroom"));

        let result = services
            .call(DOMAIN, SERVICE_SEND_COMMAND, json!({"cmd": "reset"}), Context::new(), true)
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_bridge_failure_propagates() {
        let services = Arc::new(ServiceRegistry::new());
        services.register(ESPHOME_DOMAIN, "livingroom_send_command", |_| async {
            Err(ServiceError::CallFailed("device offline".to_string()))
        });
        register_send_command(&services, loaded("livingroom"));

        let result = services
            .call(DOMAIN, SERVICE_SEND_COMMAND, json!({"command": "reset"}), Context::new(), true)
            .await;
        assert!(matches!(result, Err(ServiceError::CallFailed(msg)) if msg == "device offline"));
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let services = Arc::new(ServiceRegistry::new());
        register_send_command(&services, loaded("attic"));

        let result = services
            .call(DOMAIN, SERVICE_SEND_COMMAND, json!({"command": "reset"}), Context::new(), true)
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound { service, .. }) if service == "attic_send_command"));
    }
}
