//! Device API endpoint: `/api/v1/{device_type}/{device_number}/{member}`.
//!
//! Request shape is checked here and rejected with HTTP 400 plain text.
//! Everything past classification answers with an envelope: HTTP 200 for
//! domain errors, HTTP 500 only for unexpected failures.

use alpaca_sim_core::error::codes;
use alpaca_sim_core::{DeviceType, Envelope, Value, IMAGE_BYTES_CONTENT_TYPE};
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use tower::ServiceExt;
use tracing::error;

use super::AppState;
use crate::service::{
    classify, DeviceRequest, OperationError, OperationResponse, Params, RequestError,
};

/// Handles `GET` and `PUT` against one device member.
pub async fn device_handler(
    State(state): State<AppState>,
    Path((device_type, device_number, member)): Path<(String, String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();

    let decoded = decode_request(
        &device_type,
        &device_number,
        &member,
        &method,
        query.as_deref(),
        &headers,
        &body,
    );
    let (request, client_id) = match decoded {
        Ok(decoded) => decoded,
        Err(err) => return bad_request(&err),
    };

    let result = state.service.clone().oneshot(request).await;
    let server_id = state.service.next_transaction_id();
    operation_response(client_id, server_id, result)
}

/// Renders an operation result: envelope, `ImageBytes` frame or HTTP 500.
fn operation_response(
    client_id: u32,
    server_id: u32,
    result: Result<OperationResponse, OperationError>,
) -> Response {
    match result {
        Ok(OperationResponse::Value(value)) => {
            Json(Envelope::ok(client_id, server_id, Some(value))).into_response()
        }
        Ok(OperationResponse::Empty) => {
            Json(Envelope::<Value>::ok(client_id, server_id, None)).into_response()
        }
        Ok(OperationResponse::Image(image)) => (
            [(header::CONTENT_TYPE, IMAGE_BYTES_CONTENT_TYPE)],
            image.to_image_bytes(),
        )
            .into_response(),
        Err(OperationError::Device(err)) => {
            Json(Envelope::<Value>::error(client_id, server_id, &err)).into_response()
        }
        Err(OperationError::Internal(err)) => {
            error!(error = %err, "device operation failed unexpectedly");
            let envelope = Envelope::<Value>::raw_error(
                client_id,
                server_id,
                codes::UNEXPECTED,
                err.to_string(),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
        }
    }
}

/// Decodes path, parameters and member into a classified request.
///
/// `PUT` arguments come from the body; query arguments are also accepted and
/// consulted after the body.
fn decode_request(
    device_type: &str,
    device_number: &str,
    member: &str,
    method: &Method,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(DeviceRequest, u32), RequestError> {
    let device_number = device_number
        .parse::<u32>()
        .map_err(|_| RequestError::InvalidDeviceNumber(device_number.to_string()))?;

    let query_params = Params::from_query(query)?;
    let params = if *method == Method::PUT {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let mut params = Params::from_body(content_type, body)?;
        params.extend(query_params);
        params
    } else {
        query_params
    };
    let client_id = params.client_transaction_id()?;

    let type_tag = device_type.to_ascii_lowercase();
    let parsed_type = type_tag.parse::<DeviceType>().ok();
    let member = member.to_ascii_lowercase();
    let operation = classify(parsed_type, &member, method, &params)?;

    Ok((
        DeviceRequest {
            device_type: parsed_type,
            type_tag,
            device_number,
            operation,
        },
        client_id,
    ))
}

fn bad_request(err: &RequestError) -> Response {
    (StatusCode::BAD_REQUEST, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alpaca_sim_core::image::HEADER_LEN;
    use alpaca_sim_core::SimulatorConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;

    use super::*;
    use crate::network::handlers::tests::{state_with, test_state};
    use crate::network::{build_router, NetworkConfig};
    use crate::service::ConfigSource;

    const OBSERVATORY: &str = "\
devices:
  camera:
    0:
      exposuremin: 0.001
      exposuremax: 3600
      numx: 16
      numy: 12
  focuser:
    0:
      position: 5000
  telescope:
    0: {}
";

    fn observatory() -> Router {
        let state = state_with(
            ConfigSource::Builtin,
            SimulatorConfig::from_yaml_str(OBSERVATORY).unwrap(),
        );
        build_router(state, &NetworkConfig::default())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    async fn get(app: &Router, uri: &str) -> serde_json::Value {
        let (status, _, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        serde_json::from_slice(&body).unwrap()
    }

    fn put_request(uri: &str, form: &str) -> Request<Body> {
        Request::put(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    async fn put(app: &Router, uri: &str, form: &str) -> serde_json::Value {
        let (status, _, body) = send(app, put_request(uri, form)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        serde_json::from_slice(&body).unwrap()
    }

    async fn wait_for_idle(app: &Router) {
        for _ in 0..500 {
            let state = get(app, "/api/v1/camera/0/camerastate").await;
            let ready = get(app, "/api/v1/camera/0/imageready").await;
            if state["Value"] == 0 && ready["Value"] == true {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("exposure did not complete");
    }

    #[tokio::test]
    async fn property_read_echoes_client_transaction() {
        let app = observatory();
        let json = get(&app, "/api/v1/focuser/0/position?ClientTransactionID=42").await;
        assert_eq!(json["ClientTransactionID"], 42);
        assert_eq!(json["ErrorNumber"], 0);
        assert_eq!(json["ErrorMessage"], "");
        assert_eq!(json["Value"], 5000);
        assert!(json["ServerTransactionID"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn server_transaction_ids_increase() {
        let app = observatory();
        let first = get(&app, "/api/v1/focuser/0/connected").await;
        let second = get(&app, "/api/v1/focuser/0/connected").await;
        assert!(
            second["ServerTransactionID"].as_u64().unwrap()
                > first["ServerTransactionID"].as_u64().unwrap()
        );
    }

    #[tokio::test]
    async fn unconfigured_device_is_not_found_in_band() {
        let app = observatory();
        let json = get(&app, "/api/v1/focuser/5/position").await;
        assert_eq!(json["ErrorNumber"], 0x400);
        assert_eq!(json["ErrorMessage"], "Device focuser:5 not found");
        assert!(json.get("Value").is_none());

        let json = put(&app, "/api/v1/focuser/5/move", "Position=10").await;
        assert_eq!(json["ErrorNumber"], 0x400);
    }

    #[tokio::test]
    async fn unknown_device_type_is_not_found() {
        let app = observatory();
        let json = get(&app, "/api/v1/toaster/0/connected").await;
        assert_eq!(json["ErrorNumber"], 0x400);
    }

    #[tokio::test]
    async fn exposure_below_minimum_is_invalid_value() {
        let app = observatory();
        let json = put(
            &app,
            "/api/v1/camera/0/startexposure",
            "Duration=0.0001&Light=true",
        )
        .await;
        assert_eq!(json["ErrorNumber"], 0x402);
        let state = get(&app, "/api/v1/camera/0/camerastate").await;
        assert_eq!(state["Value"], 0);
    }

    #[tokio::test]
    async fn exposure_completes_and_image_is_delivered_once() {
        let app = observatory();
        let json = put(
            &app,
            "/api/v1/camera/0/startexposure",
            "Duration=0.01&Light=true&ClientTransactionID=9",
        )
        .await;
        assert_eq!(json["ErrorNumber"], 0);
        assert_eq!(json["ClientTransactionID"], 9);
        assert!(json.get("Value").is_none());

        wait_for_idle(&app).await;
        let percent = get(&app, "/api/v1/camera/0/percentcompleted").await;
        assert_eq!(percent["Value"], 100);

        let (status, headers, body) = send(
            &app,
            Request::get("/api/v1/camera/0/imagearray")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            IMAGE_BYTES_CONTENT_TYPE
        );
        assert_eq!(u32::from_le_bytes(body[16..20].try_into().unwrap()), 44);
        let width = u32::from_le_bytes(body[32..36].try_into().unwrap()) as usize;
        let height = u32::from_le_bytes(body[36..40].try_into().unwrap()) as usize;
        assert_eq!(body.len(), HEADER_LEN + 2 * width * height);

        let again = get(&app, "/api/v1/camera/0/imagearray").await;
        assert_eq!(again["ErrorNumber"], 0x40D);
        let ready = get(&app, "/api/v1/camera/0/imageready").await;
        assert_eq!(ready["Value"], false);
    }

    #[tokio::test]
    async fn second_start_while_exposing_is_not_idle() {
        let app = observatory();
        put(&app, "/api/v1/camera/0/startexposure", "Duration=60&Light=true").await;
        let json = put(&app, "/api/v1/camera/0/startexposure", "Duration=1&Light=true").await;
        assert_eq!(json["ErrorNumber"], 0x40C);

        let json = put(&app, "/api/v1/camera/0/abortexposure", "").await;
        assert_eq!(json["ErrorNumber"], 0);
    }

    #[tokio::test]
    async fn abort_mid_exposure_returns_camera_to_idle() {
        let app = observatory();
        put(&app, "/api/v1/camera/0/startexposure", "Duration=60&Light=true").await;
        let state = get(&app, "/api/v1/camera/0/camerastate").await;
        assert_eq!(state["Value"], 2);

        put(&app, "/api/v1/camera/0/abortexposure", "").await;
        assert_eq!(get(&app, "/api/v1/camera/0/camerastate").await["Value"], 0);
        assert_eq!(get(&app, "/api/v1/camera/0/imageready").await["Value"], false);
        assert_eq!(get(&app, "/api/v1/camera/0/percentcompleted").await["Value"], 0);
    }

    #[tokio::test]
    async fn json_body_is_accepted() {
        let app = observatory();
        let request = Request::put("/api/v1/focuser/0/move")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"Position": 1234, "ClientTransactionID": 3}"#))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ClientTransactionID"], 3);
        assert_eq!(get(&app, "/api/v1/focuser/0/position").await["Value"], 1234);
    }

    #[tokio::test]
    async fn path_segments_are_case_insensitive() {
        let app = observatory();
        let json = get(&app, "/api/v1/Focuser/0/Position").await;
        assert_eq!(json["Value"], 5000);
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected_with_400() {
        let app = observatory();

        let (status, _, body) = send(
            &app,
            put_request("/api/v1/camera/0/startexposure", "Light=true"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing required parameter: Duration");

        let (status, _, _) =
            send(&app, put_request("/api/v1/focuser/0/move", "Position=far")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(
            &app,
            Request::get("/api/v1/focuser/zero/position")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(
            &app,
            Request::get("/api/v1/focuser/0/position?ClientTransactionID=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_request_for_missing_device_is_still_400() {
        let app = observatory();
        let (status, _, _) = send(&app, put_request("/api/v1/camera/7/startexposure", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    const MOTION: &str = "\
devices:
  switch:
    0:
      switches:
        \"0\":
          name: Roof Power
        \"1\":
          name: Dew Heater
          maximum: 100.0
  rotator:
    0:
      position: 350.0
  dome:
    0:
      cansyncazimuth: false
";

    fn motion() -> Router {
        let state = state_with(
            ConfigSource::Builtin,
            SimulatorConfig::from_yaml_str(MOTION).unwrap(),
        );
        build_router(state, &NetworkConfig::default())
    }

    #[tokio::test]
    async fn switch_bank_over_http() {
        let app = motion();
        assert_eq!(get(&app, "/api/v1/switch/0/maxswitch").await["Value"], 2);
        assert_eq!(
            get(&app, "/api/v1/switch/0/getswitchname?Id=1").await["Value"],
            "Dew Heater"
        );

        let json = put(&app, "/api/v1/switch/0/setswitchvalue", "Id=1&Value=40").await;
        assert_eq!(json["ErrorNumber"], 0);
        let json = get(&app, "/api/v1/switch/0/getswitchvalue?id=1").await;
        assert_eq!(json["Value"], 40.0);
        assert_eq!(get(&app, "/api/v1/switch/0/getswitch?Id=1").await["Value"], true);

        let json = put(&app, "/api/v1/switch/0/setswitchvalue", "Id=1&Value=400").await;
        assert_eq!(json["ErrorNumber"], 0x402);
        let json = get(&app, "/api/v1/switch/0/getswitch?Id=9").await;
        assert_eq!(json["ErrorNumber"], 0x402);
        assert_eq!(json["ErrorMessage"], "Invalid switch ID: 9");

        let (status, _, body) =
            send(&app, Request::get("/api/v1/switch/0/getswitch").body(Body::empty()).unwrap())
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing required parameter: Id");
    }

    #[tokio::test]
    async fn rotator_and_dome_positions_over_http() {
        let app = motion();
        put(&app, "/api/v1/rotator/0/move", "Position=20").await;
        let json = get(&app, "/api/v1/rotator/0/position").await;
        assert!((json["Value"].as_f64().unwrap() - 10.0).abs() < 1e-9);

        put(&app, "/api/v1/dome/0/slewtoazimuth", "Azimuth=90").await;
        put(&app, "/api/v1/dome/0/setpark", "").await;
        put(&app, "/api/v1/dome/0/slewtoazimuth", "Azimuth=200").await;
        put(&app, "/api/v1/dome/0/park", "").await;
        assert_eq!(get(&app, "/api/v1/dome/0/azimuth").await["Value"], 90.0);
        assert_eq!(get(&app, "/api/v1/dome/0/atpark").await["Value"], true);

        let json = put(&app, "/api/v1/dome/0/synctoazimuth", "Azimuth=10").await;
        assert_eq!(json["ErrorNumber"], 0x401);
        assert_eq!(json["ErrorMessage"], "Dome cannot synctoazimuth");
    }

    #[tokio::test]
    async fn internal_failure_is_500_with_envelope() {
        let response = operation_response(
            7,
            9,
            Err(OperationError::Internal(anyhow::anyhow!("catalogue unreadable"))),
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ErrorNumber"], 1280);
        assert_eq!(json["ClientTransactionID"], 7);
        assert_eq!(json["ServerTransactionID"], 9);
        assert!(json["ErrorMessage"]
            .as_str()
            .unwrap()
            .contains("catalogue unreadable"));
    }

    #[tokio::test]
    async fn in_flight_guard_is_released() {
        let state = test_state();
        let shutdown = std::sync::Arc::clone(&state.shutdown);
        let app = build_router(state, &NetworkConfig::default());
        get(&app, "/api/v1/dome/0/connected").await;
        assert_eq!(shutdown.in_flight_count(), 0);
    }
}
