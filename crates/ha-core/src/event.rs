//! Event types for the event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Context;

/// Event type that listeners use to receive every event
pub const MATCH_ALL: &str = "*";

/// Event type identifier (e.g. "esphome.emontx_raw")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_match_all(&self) -> bool {
        self.0 == MATCH_ALL
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event fired on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T = serde_json::Value> {
    pub event_type: EventType,

    /// Event payload; opaque to the bus
    pub data: T,

    pub origin: EventOrigin,

    pub time_fired: DateTime<Utc>,

    pub context: Context,
}

impl<T> Event<T> {
    /// Create a new local event stamped with the current time
    pub fn new(event_type: impl Into<EventType>, data: T, context: Context) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            origin: EventOrigin::Local,
            time_fired: Utc::now(),
            context,
        }
    }

    pub fn with_origin(mut self, origin: EventOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Origin of an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    #[default]
    Local,
    /// Fired by a device bridge or another instance
    Remote,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_defaults_to_local_origin() {
        let event = Event::new("esphome.emontx_raw", json!({"power": 120}), Context::new());
        assert_eq!(event.origin, EventOrigin::Local);
        assert_eq!(event.event_type.as_str(), "esphome.emontx_raw");

        let event = event.with_origin(EventOrigin::Remote);
        assert_eq!(event.origin, EventOrigin::Remote);
    }

    #[test]
    fn test_match_all() {
        assert!(EventType::from(MATCH_ALL).is_match_all());
        assert!(!EventType::from("state_changed").is_match_all());
    }

    #[test]
    fn test_origin_serializes_lowercase() {
        assert_eq!(serde_json::to_value(EventOrigin::Remote).unwrap(), json!("remote"));
    }
}
