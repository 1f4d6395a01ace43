//! Alpaca Simulator Server: HTTP device API, per-device state store and the
//! camera exposure engine.

pub mod exposure;
pub mod network;
pub mod service;
pub mod storage;

pub use network::{build_router, NetworkConfig, NetworkModule};
pub use service::{ConfigSource, DeviceService, ServerConfig};
