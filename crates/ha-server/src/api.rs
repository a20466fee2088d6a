//! REST API
//!
//! The subset of the Home Assistant REST API the emonTx panel and the
//! integrations page need: panels, config and options flows, entry
//! removal and service calls. Everything else falls through to the
//! registered static paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use ha_config_entries::{ConfigEntriesError, FlowError, FlowResult};
use ha_core::Context;
use ha_frontend::Panel;
use ha_service_registry::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::hub::HomeAssistant;

type AppState = Arc<HomeAssistant>;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

fn flow_error(err: FlowError) -> ApiError {
    let status = match &err {
        FlowError::UnknownHandler(_)
        | FlowError::UnknownFlow(_)
        | FlowError::ConfigEntries(ConfigEntriesError::NotFound(_)) => StatusCode::NOT_FOUND,
        FlowError::OptionsNotSupported(_) | FlowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FlowError::ConfigEntries(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// Body of the flow start endpoints
#[derive(Debug, Deserialize)]
pub struct StartFlowRequest {
    /// Domain for config flows, entry id for options flows
    pub handler: String,
}

/// Create the API router
pub fn create_router(hass: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/panels", get(get_panels))
        .route("/api/services/:domain/:service", post(call_service))
        .route(
            "/api/config/config_entries/entry/:entry_id",
            delete(delete_config_entry),
        )
        .route("/api/config/config_entries/flow", post(start_config_flow))
        .route(
            "/api/config/config_entries/flow/:flow_id",
            post(progress_flow).delete(abort_flow),
        )
        .route(
            "/api/config/config_entries/options/flow",
            post(start_options_flow),
        )
        .route(
            "/api/config/config_entries/options/flow/:flow_id",
            post(progress_flow).delete(abort_flow),
        )
        .fallback(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(hass)
}

/// GET /api/panels - Registered panels by url path
async fn get_panels(State(hass): State<AppState>) -> Json<BTreeMap<String, Panel>> {
    let panels = hass
        .frontend
        .panels()
        .into_iter()
        .map(|panel| (panel.url_path.clone(), panel))
        .collect();
    Json(panels)
}

/// POST /api/services/{domain}/{service} - Call a service and wait for it
async fn call_service(
    State(hass): State<AppState>,
    Path((domain, service)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let service_data = body.map(|Json(data)| data).unwrap_or(Value::Null);

    match hass
        .services
        .call(&domain, &service, service_data, Context::new(), true)
        .await
    {
        Ok(()) => Ok(Json(Vec::new())),
        Err(err) => {
            let status = match &err {
                ServiceError::NotFound { .. } | ServiceError::InvalidData(_) => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::CallFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err(api_error(status, format!("Service call failed: {}", err)))
        }
    }
}

/// DELETE /api/config/config_entries/entry/{entry_id} - Remove a config entry
async fn delete_config_entry(
    State(hass): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    info!("HTTP DELETE config entry: {}", entry_id);

    match hass.config_entries.remove(&entry_id).await {
        Ok(_) => Ok(Json(serde_json::json!({ "require_restart": false }))),
        Err(ConfigEntriesError::NotFound(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Invalid entry specified: {}", entry_id),
        )),
        Err(err) => {
            warn!("Failed to delete config entry {}: {}", entry_id, err);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

/// POST /api/config/config_entries/flow - Start a config flow
async fn start_config_flow(
    State(hass): State<AppState>,
    Json(request): Json<StartFlowRequest>,
) -> Result<Json<FlowResult>, ApiError> {
    info!("HTTP POST start config flow for handler: {}", request.handler);
    hass.flows
        .start_flow(&request.handler)
        .await
        .map(Json)
        .map_err(flow_error)
}

/// POST /api/config/config_entries/options/flow - Start an options flow
async fn start_options_flow(
    State(hass): State<AppState>,
    Json(request): Json<StartFlowRequest>,
) -> Result<Json<FlowResult>, ApiError> {
    info!("HTTP POST start options flow for entry: {}", request.handler);
    hass.flows
        .start_options_flow(&request.handler)
        .await
        .map(Json)
        .map_err(flow_error)
}

/// POST .../flow/{flow_id} - Submit a flow's form
async fn progress_flow(
    State(hass): State<AppState>,
    Path(flow_id): Path<String>,
    Json(user_input): Json<Value>,
) -> Result<Json<FlowResult>, ApiError> {
    hass.flows
        .progress_flow(&flow_id, user_input)
        .await
        .map(Json)
        .map_err(flow_error)
}

/// DELETE .../flow/{flow_id} - Abort a flow
async fn abort_flow(
    State(hass): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if hass.flows.abort_flow(&flow_id) {
        Ok(Json(serde_json::json!({ "message": "Flow aborted" })))
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Invalid flow specified: {}", flow_id),
        ))
    }
}

async fn static_files(State(hass): State<AppState>, request: Request) -> Response {
    hass.frontend.serve(request).await.into_response()
}
