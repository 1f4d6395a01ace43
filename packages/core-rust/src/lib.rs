//! Alpaca Simulator Core: device identities, property values, error taxonomy,
//! response envelopes, configuration, and the `ImageBytes` codec.

pub mod config;
pub mod defaults;
pub mod enums;
pub mod envelope;
pub mod error;
pub mod image;
pub mod registry;
pub mod types;

pub use config::{ConfigError, SimulatorConfig, SimulatorSettings};
pub use enums::CameraState;
pub use envelope::{Envelope, TransactionCounter};
pub use error::AlpacaError;
pub use image::{PixelGrid, IMAGE_BYTES_CONTENT_TYPE};
pub use registry::DeviceRegistry;
pub use types::{property_map, DeviceIdentity, DeviceType, PropertyMap, PropertyMapExt, Value};
