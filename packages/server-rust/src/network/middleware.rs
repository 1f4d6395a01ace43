//! HTTP middleware stack for the simulator.
//!
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use std::any::Any as PanicPayload;

use alpaca_sim_core::error::codes;
use alpaca_sim_core::Envelope;
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use super::config::NetworkConfig;
use crate::service::operation::panic_message;

/// Builds the response for a request whose handler panicked.
type PanicHandler = fn(Box<dyn PanicPayload + Send + 'static>) -> Response;

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            CorsLayer,
            tower::layer::util::Stack<
                CatchPanicLayer<PanicHandler>,
                tower::layer::util::Stack<
                    TraceLayer<
                        tower_http::classify::SharedClassifier<
                            tower_http::classify::ServerErrorsAsFailures,
                        >,
                    >,
                    tower::layer::util::Stack<
                        SetRequestIdLayer<MakeRequestUuid>,
                        tower::layer::util::Identity,
                    >,
                >,
            >,
        >,
    >,
>;

/// Builds the HTTP-level Tower middleware stack.
///
/// **Outermost to innermost:**
/// 1. `SetRequestId` -- assigns an `X-Request-Id` to every incoming request
/// 2. `Tracing` -- request/response spans
/// 3. `CatchPanic` -- a panicking handler answers 500 with an error envelope
/// 4. `CORS` -- Alpaca clients in browsers issue `GET` and `PUT`
/// 5. `Timeout` -- caps request processing time
/// 6. `PropagateRequestId` -- echoes `X-Request-Id` on the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            x_request_id.clone(),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response as PanicHandler))
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// Transaction ids are unknown once a handler has unwound, so both are 0.
fn panic_response(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    error!(panic = message, "request handler panicked");
    let envelope = Envelope::<()>::raw_error(
        0,
        0,
        codes::UNEXPECTED,
        format!("Internal server error: {message}"),
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
}

/// A wildcard `"*"` allows any origin; otherwise each entry is an exact origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::PUT])
        .allow_headers(Any)
}
