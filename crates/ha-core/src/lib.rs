//! Core types for the Home Assistant host surfaces
//!
//! This crate provides the types every other host crate passes around:
//! Event, Context, and ServiceCall. Integrations only ever see these;
//! the bus and the service registry live in their own crates.

mod context;
mod event;
mod service_call;

pub use context::Context;
pub use event::{Event, EventOrigin, EventType, MATCH_ALL};
pub use service_call::ServiceCall;

/// Data mapping carried by config entries, flow input and service calls
pub type ConfigData = std::collections::HashMap<String, serde_json::Value>;
