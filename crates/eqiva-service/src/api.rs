//! HTTP endpoints for the thermostat bridge.
//!
//! Every request addresses one thermostat by MAC address, written with
//! colons or dashes in any case:
//!
//! - `GET /{mac}/status` returns the stored status, creating a default
//!   entry for a thermostat seen for the first time
//! - `GET /{mac}/targetTemperature/{celsius}` sets the target temperature
//! - `GET /{mac}/targetHeatingCoolingState/{state}` switches off (0),
//!   manual (1 or 2) or auto (3)
//!
//! The value can also be given as `?value=`. Commands answer
//! `{"result":"ok"}` or `{"result":"error","message":...}`; an unreachable
//! thermostat gives 404 and a malformed request 400.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, warn};

use eqiva_core::{BaseMode, Connector, Error, Operation, Preset, looks_like_address};

use crate::state::AppState;

/// Create the API router.
pub fn router<C: Connector + 'static>() -> Router<Arc<AppState<C>>> {
    Router::new()
        .route("/{mac}/{request}", get(handle::<C>))
        .route("/{mac}/{request}/{value}", get(handle_with_value::<C>))
}

/// Optional `?value=` parameter.
#[derive(Debug, Deserialize)]
pub struct ValueQuery {
    pub value: Option<String>,
}

async fn handle<C: Connector + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path((mac, request)): Path<(String, String)>,
    Query(query): Query<ValueQuery>,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &mac, &request, query.value).await
}

async fn handle_with_value<C: Connector + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path((mac, request, value)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    dispatch(&state, &mac, &request, Some(value)).await
}

async fn dispatch<C: Connector>(
    state: &AppState<C>,
    mac: &str,
    request: &str,
    value: Option<String>,
) -> Result<Json<Value>, ApiError> {
    let mac = normalize_mac(mac)?;

    let operation = match request {
        "status" => return status(state, &mac).await,
        "targetTemperature" => {
            let value = required(value)?;
            let celsius = value.parse::<f32>().map_err(|_| {
                ApiError::BadRequest(format!("Invalid temperature '{}'", value))
            })?;
            Operation::SetTemperature(celsius)
        }
        "targetHeatingCoolingState" => match required(value)?.as_str() {
            "0" => Operation::Preset(Preset::Off),
            "1" | "2" => Operation::SetMode(BaseMode::Manual),
            "3" => Operation::SetMode(BaseMode::Auto),
            other => {
                return Err(ApiError::BadRequest(format!(
                    "Invalid heating state '{}': expected 0, 1, 2 or 3",
                    other
                )));
            }
        },
        _ => {
            warn!("Invalid request: mac={}, request={}", mac, request);
            return Err(ApiError::BadRequest("Invalid request".to_string()));
        }
    };

    match state.run(&mac, &[operation]).await {
        Ok(_) => {
            save(state).await;
            Ok(Json(json!({ "result": "ok" })))
        }
        Err(e @ (Error::DeviceNotFound(_) | Error::ConnectionFailed { .. })) => {
            error!("Device with address {} was not found: {}", mac, e);
            Err(ApiError::NotFound(format!(
                "Device with address {} was not found",
                mac
            )))
        }
        Err(e) => {
            error!("{} on {} failed: {}", request, mac, e);
            Ok(Json(json!({ "result": "error", "message": e.to_string() })))
        }
    }
}

async fn status<C: Connector>(state: &AppState<C>, mac: &str) -> Result<Json<Value>, ApiError> {
    let (entry, added) = state.store.get_or_insert_default(mac).await;
    if added {
        save(state).await;
    }
    serde_json::to_value(entry)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn save<C: Connector>(state: &AppState<C>) {
    if let Err(e) = state.store.save().await {
        warn!("{}", e);
    }
}

fn required(value: Option<String>) -> Result<String, ApiError> {
    value.ok_or_else(|| ApiError::BadRequest("Missing value".to_string()))
}

/// `00-1a-22-...` and `00:1A:22:...` name the same thermostat.
pub fn normalize_mac(mac: &str) -> Result<String, ApiError> {
    let normalized = mac.replace('-', ":").to_uppercase();
    if normalized.len() == 17 && looks_like_address(&normalized) {
        Ok(normalized)
    } else {
        Err(ApiError::BadRequest(format!("Invalid device address '{}'", mac)))
    }
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "result": "error", "message": message })),
            )
                .into_response(),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}
