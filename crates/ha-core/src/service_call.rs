//! Service call type for invoking services

use crate::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A call to a registered service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Domain the service belongs to (e.g. "esphome")
    pub domain: String,

    /// Service name (e.g. "livingroom_send_command")
    pub service: String,

    pub service_data: serde_json::Value,

    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Deserialize the whole service data into a typed request
    ///
    /// A `null` payload is treated as an empty mapping.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.service_data {
            serde_json::Value::Null => serde_json::from_value(serde_json::json!({})),
            data => T::deserialize(data),
        }
    }
}
