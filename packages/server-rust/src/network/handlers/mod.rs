//! Axum handlers and the state they share.

pub mod device;
pub mod health;
pub mod management;

pub use device::device_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use management::{
    api_info_handler, api_versions_handler, configured_devices_handler, description_handler,
    not_found_handler, reload_handler, root_handler,
};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::DeviceService;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Device registry, state store and exposure engine.
    pub service: DeviceService,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, used for uptime.
    pub start_time: Instant,
}
