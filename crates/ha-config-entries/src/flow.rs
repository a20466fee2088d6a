//! Config and options flows
//!
//! A flow is a small wizard owned by an integration. Each step either shows
//! a form, finishes by creating (or, for options flows, updating) an entry,
//! or aborts. The [`FlowManager`] keeps flows that are waiting for input,
//! validates the submitted input against the form that was shown, and turns
//! finished flows into config entries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_core::ConfigData;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::entry::{ConfigEntry, ConfigEntryUpdate};
use crate::manager::{ConfigEntries, ConfigEntriesError};
use crate::schema::{validate_input, FormField};

/// Abort reason used when the unique id is already configured
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

/// Step a config flow starts at
pub const STEP_USER: &str = "user";

/// Step an options flow starts at
pub const STEP_INIT: &str = "init";

/// A flow step aborted; also usable with `?` inside a step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("flow aborted: {reason}")]
pub struct AbortFlow {
    pub reason: String,
}

impl AbortFlow {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Flow manager errors
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("no config flow registered for {0}")]
    UnknownHandler(String),

    #[error("flow not found: {0}")]
    UnknownFlow(String),

    #[error("{0} does not support options")]
    OptionsNotSupported(String),

    #[error("invalid user input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

/// What a flow step produced
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    Form {
        step_id: String,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
    },
    CreateEntry {
        title: String,
        data: ConfigData,
    },
    Abort {
        reason: String,
    },
}

impl FlowStep {
    pub fn form(step_id: impl Into<String>, data_schema: Vec<FormField>) -> Self {
        Self::Form {
            step_id: step_id.into(),
            data_schema,
            errors: HashMap::new(),
        }
    }

    pub fn create_entry(title: impl Into<String>, data: ConfigData) -> Self {
        Self::CreateEntry {
            title: title.into(),
            data,
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
        }
    }
}

/// Per-flow view of the host handed to config flow steps
pub struct FlowContext {
    domain: String,
    entries: Arc<ConfigEntries>,
    unique_id: Option<String>,
}

impl FlowContext {
    pub fn new(domain: impl Into<String>, entries: Arc<ConfigEntries>) -> Self {
        Self {
            domain: domain.into(),
            entries,
            unique_id: None,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Set the unique id the created entry will carry
    pub fn set_unique_id(&mut self, unique_id: impl Into<String>) {
        self.unique_id = Some(unique_id.into());
    }

    /// Abort if an entry of this domain already has the flow's unique id
    pub fn abort_if_unique_id_configured(&self) -> Result<(), AbortFlow> {
        match &self.unique_id {
            Some(unique_id)
                if self
                    .entries
                    .get_by_unique_id(&self.domain, unique_id)
                    .is_some() =>
            {
                Err(AbortFlow::new(ABORT_ALREADY_CONFIGURED))
            }
            _ => Ok(()),
        }
    }
}

/// A flow that creates a config entry
#[async_trait]
pub trait ConfigFlow: Send + Sync {
    /// Version stamped on entries this flow creates
    fn version(&self) -> u32 {
        1
    }

    async fn step(
        &mut self,
        step_id: &str,
        ctx: &mut FlowContext,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, AbortFlow>;
}

/// A flow that edits the options of an existing entry
#[async_trait]
pub trait OptionsFlow: Send + Sync {
    async fn step(
        &mut self,
        step_id: &str,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, AbortFlow>;
}

/// Creates flows for one integration domain
pub trait FlowHandler: Send + Sync {
    fn create_flow(&self) -> Box<dyn ConfigFlow>;

    /// Options flow for an entry, `None` if the integration has no options
    fn create_options_flow(&self, _entry: &ConfigEntry) -> Option<Box<dyn OptionsFlow>> {
        None
    }
}

/// Result type of a flow step, as reported to the frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

/// Serializable outcome of starting or progressing a flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub flow_id: String,
    /// Integration domain, or the entry id for options flows
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Always present, empty unless this is a form
    pub data_schema: Vec<FormField>,
    pub errors: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Data (or options) written by a finished flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ConfigData>,
    /// Entry created or updated by a finished flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl FlowResult {
    fn base(flow_id: &str, handler: &str, result_type: FlowResultType) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            handler: handler.to_string(),
            result_type,
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            title: None,
            reason: None,
            version: None,
            data: None,
            entry_id: None,
        }
    }

    fn abort(flow_id: &str, handler: &str, reason: String) -> Self {
        Self {
            reason: Some(reason),
            ..Self::base(flow_id, handler, FlowResultType::Abort)
        }
    }
}

enum FlowKind {
    Config {
        flow: Box<dyn ConfigFlow>,
        ctx: FlowContext,
    },
    Options {
        flow: Box<dyn OptionsFlow>,
    },
}

/// A flow waiting for input on a form
struct ActiveFlow {
    /// Domain for config flows, entry id for options flows
    handler: String,
    kind: FlowKind,
    step_id: String,
    /// Schema of the form last shown
    data_schema: Vec<FormField>,
}

/// Runs config and options flows
pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    handlers: DashMap<String, Arc<dyn FlowHandler>>,
    flows: DashMap<String, ActiveFlow>,
}

impl FlowManager {
    pub fn new(entries: Arc<ConfigEntries>) -> Self {
        Self {
            entries,
            handlers: DashMap::new(),
            flows: DashMap::new(),
        }
    }

    /// Register the flow handler for a domain
    pub fn register(&self, domain: &str, handler: Arc<dyn FlowHandler>) {
        self.handlers.insert(domain.to_string(), handler);
        debug!("Registered flow handler for domain: {}", domain);
    }

    fn handler(&self, domain: &str) -> Result<Arc<dyn FlowHandler>, FlowError> {
        self.handlers
            .get(domain)
            .map(|h| h.value().clone())
            .ok_or_else(|| FlowError::UnknownHandler(domain.to_string()))
    }

    /// Start a config flow for a domain at its `user` step
    pub async fn start_flow(&self, domain: &str) -> Result<FlowResult, FlowError> {
        let flow = self.handler(domain)?.create_flow();
        let active = ActiveFlow {
            handler: domain.to_string(),
            kind: FlowKind::Config {
                flow,
                ctx: FlowContext::new(domain, self.entries.clone()),
            },
            step_id: STEP_USER.to_string(),
            data_schema: Vec::new(),
        };

        let flow_id = Ulid::new().to_string();
        debug!(flow_id = %flow_id, handler = %domain, "Starting config flow");
        self.run_step(flow_id, active, None).await
    }

    /// Start the options flow of an entry at its `init` step
    pub async fn start_options_flow(&self, entry_id: &str) -> Result<FlowResult, FlowError> {
        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        let flow = self
            .handler(&entry.domain)?
            .create_options_flow(&entry)
            .ok_or_else(|| FlowError::OptionsNotSupported(entry.domain.clone()))?;

        let active = ActiveFlow {
            handler: entry_id.to_string(),
            kind: FlowKind::Options { flow },
            step_id: STEP_INIT.to_string(),
            data_schema: Vec::new(),
        };

        let flow_id = Ulid::new().to_string();
        debug!(flow_id = %flow_id, entry_id = %entry_id, "Starting options flow");
        self.run_step(flow_id, active, None).await
    }

    /// Submit input to the form a flow is waiting on
    ///
    /// Invalid input leaves the flow waiting on the same form.
    pub async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: serde_json::Value,
    ) -> Result<FlowResult, FlowError> {
        let (_, active) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;

        let input = match validate_input(&active.data_schema, &user_input) {
            Ok(input) => input,
            Err(message) => {
                self.flows.insert(flow_id.to_string(), active);
                return Err(FlowError::InvalidInput(message));
            }
        };

        self.run_step(flow_id.to_string(), active, Some(input)).await
    }

    /// Drop a flow that is waiting for input
    pub fn abort_flow(&self, flow_id: &str) -> bool {
        self.flows.remove(flow_id).is_some()
    }

    /// Number of flows waiting for input
    pub fn in_progress(&self) -> usize {
        self.flows.len()
    }

    async fn run_step(
        &self,
        flow_id: String,
        mut active: ActiveFlow,
        user_input: Option<ConfigData>,
    ) -> Result<FlowResult, FlowError> {
        let outcome = match &mut active.kind {
            FlowKind::Config { flow, ctx } => flow.step(&active.step_id, ctx, user_input).await,
            FlowKind::Options { flow } => flow.step(&active.step_id, user_input).await,
        };

        let step = match outcome {
            Ok(step) => step,
            Err(abort) => FlowStep::Abort {
                reason: abort.reason,
            },
        };

        match step {
            FlowStep::Form {
                step_id,
                data_schema,
                errors,
            } => {
                let result = FlowResult {
                    step_id: Some(step_id.clone()),
                    data_schema: data_schema.clone(),
                    errors: Some(errors),
                    ..FlowResult::base(&flow_id, &active.handler, FlowResultType::Form)
                };
                active.step_id = step_id;
                active.data_schema = data_schema;
                self.flows.insert(flow_id, active);
                Ok(result)
            }
            FlowStep::Abort { reason } => {
                info!(flow_id = %flow_id, handler = %active.handler, reason = %reason, "Flow aborted");
                Ok(FlowResult::abort(&flow_id, &active.handler, reason))
            }
            FlowStep::CreateEntry { title, data } => match active.kind {
                FlowKind::Config { flow, ctx } => {
                    self.finish_config_flow(&flow_id, flow.version(), ctx, title, data)
                        .await
                }
                FlowKind::Options { .. } => {
                    self.finish_options_flow(&flow_id, &active.handler, title, data)
                        .await
                }
            },
        }
    }

    async fn finish_config_flow(
        &self,
        flow_id: &str,
        version: u32,
        ctx: FlowContext,
        title: String,
        data: ConfigData,
    ) -> Result<FlowResult, FlowError> {
        let mut entry = ConfigEntry::new(ctx.domain(), title.clone())
            .with_data(data.clone())
            .with_version(version);
        if let Some(unique_id) = ctx.unique_id() {
            entry = entry.with_unique_id(unique_id);
        }

        let entry = match self.entries.add(entry).await {
            Ok(entry) => entry,
            Err(ConfigEntriesError::AlreadyExists { .. }) => {
                return Ok(FlowResult::abort(
                    flow_id,
                    ctx.domain(),
                    ABORT_ALREADY_CONFIGURED.to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        // The entry exists even if its setup fails; the error is kept on it
        if let Err(err) = self.entries.setup(&entry.entry_id).await {
            warn!(entry_id = %entry.entry_id, error = %err, "Setup of new entry failed");
        }

        Ok(FlowResult {
            title: Some(title),
            version: Some(version),
            data: Some(data),
            entry_id: Some(entry.entry_id),
            ..FlowResult::base(flow_id, ctx.domain(), FlowResultType::CreateEntry)
        })
    }

    async fn finish_options_flow(
        &self,
        flow_id: &str,
        entry_id: &str,
        title: String,
        options: ConfigData,
    ) -> Result<FlowResult, FlowError> {
        let entry = self
            .entries
            .update(entry_id, ConfigEntryUpdate::new().options(options.clone()))
            .await?;
        info!(entry_id = %entry_id, "Options updated for {}", entry.domain);

        Ok(FlowResult {
            title: Some(title),
            data: Some(options),
            entry_id: Some(entry.entry_id),
            ..FlowResult::base(flow_id, entry_id, FlowResultType::CreateEntry)
        })
    }
}
