//! Config Entries
//!
//! This crate provides the configuration entry system. Config entries
//! represent individual integration instances and manage their lifecycle
//! (setup, unload, reload). Entries are created by config flows and edited
//! by options flows.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`EntryHandler`] - What an integration implements to be set up
//! - [`FlowManager`] - Runs config and options flows
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking.

pub mod entry;
pub mod flow;
pub mod handler;
pub mod manager;
pub mod schema;
pub mod state_machine;
pub mod storage;

// Re-export main types
pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate};
pub use flow::{
    AbortFlow, ConfigFlow, FlowContext, FlowError, FlowHandler, FlowManager, FlowResult,
    FlowResultType, FlowStep, OptionsFlow,
};
pub use handler::{EntryHandler, HandlerResult, OnUnload};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_VERSION,
};
pub use schema::{FormField, SelectOption, SelectSelectorConfig, SelectSelectorMode, Selector};
pub use state_machine::InvalidTransition;
pub use storage::{Storage, StorageError, StorageFile, StorageResult};
