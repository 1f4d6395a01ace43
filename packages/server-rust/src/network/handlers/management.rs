//! Discovery, management and reload endpoints.

use alpaca_sim_core::Envelope;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::service::domain::common::device_name;
use crate::service::Params;

/// Supported Alpaca API versions.
const API_VERSIONS: [u32; 1] = [1];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServerDescription {
    server_name: String,
    manufacturer: String,
    manufacturer_version: &'static str,
    location: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConfiguredDevice {
    device_name: String,
    device_type: &'static str,
    device_number: u32,
    #[serde(rename = "UniqueID")]
    unique_id: String,
}

/// Wraps `value` in an envelope, echoing the query's `ClientTransactionID`.
fn envelope<T: Serialize>(state: &AppState, query: Option<&str>, value: T) -> Response {
    let client_id = match Params::from_query(query).and_then(|p| p.client_transaction_id()) {
        Ok(id) => id,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    let server_id = state.service.next_transaction_id();
    Json(Envelope::ok(client_id, server_id, Some(value))).into_response()
}

/// `GET /management/apiversions`
pub async fn api_versions_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    envelope(&state, query.as_deref(), API_VERSIONS)
}

/// `GET /management/v1/description`
pub async fn description_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let config = state.service.config();
    let description = ServerDescription {
        server_name: config.server_name.clone(),
        manufacturer: config.manufacturer.clone(),
        manufacturer_version: env!("CARGO_PKG_VERSION"),
        location: config.location.clone(),
    };
    envelope(&state, query.as_deref(), description)
}

/// `GET /management/v1/configureddevices`
///
/// Lists the current registry in identity order.
pub async fn configured_devices_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let catalogue = state.service.catalogue().load();
    let devices: Vec<ConfiguredDevice> = catalogue
        .registry
        .configured_devices()
        .map(|(id, config)| ConfiguredDevice {
            device_name: device_name(config, id),
            device_type: id.device_type.display_name(),
            device_number: id.device_number,
            unique_id: format!("{}-{}", id.device_type.as_str(), id.device_number),
        })
        .collect();
    envelope(&state, query.as_deref(), devices)
}

/// `GET|PUT /reload`
///
/// Re-reads the configuration source. A failed reload leaves the running
/// configuration untouched and answers 500.
pub async fn reload_handler(State(state): State<AppState>) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    match state.service.reload() {
        Ok(()) => Json(json!({ "message": "State config reloaded" })).into_response(),
        Err(err) => {
            error!(error = %err, "configuration reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": format!("Reload failed: {err}") })),
            )
                .into_response()
        }
    }
}

/// `GET /`
pub async fn root_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.service.config();
    Json(json!({
        "name": config.server_name,
        "version": env!("CARGO_PKG_VERSION"),
        "api": "/api/v1",
        "management": "/management/apiversions",
    }))
}

/// `GET /api/v1`
pub async fn api_info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let catalogue = state.service.catalogue().load();
    let mut device_types: Vec<&'static str> = catalogue
        .registry
        .configured_devices()
        .map(|(id, _)| id.device_type.as_str())
        .collect();
    device_types.dedup();
    Json(json!({
        "api_version": API_VERSIONS[0],
        "path": "/api/v1/{device_type}/{device_number}/{member}",
        "device_types": device_types,
    }))
}

/// Anything that matches no route.
pub async fn not_found_handler() -> (StatusCode, &'static str) {
    info!("request for unknown route");
    (StatusCode::BAD_REQUEST, "Device or method not found")
}
