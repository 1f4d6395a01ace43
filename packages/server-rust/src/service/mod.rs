//! Device request pipeline.
//!
//! 1. **Parameters** (`params`): query string or body -> case-insensitive [`Params`]
//! 2. **Classification** (`classify`): member + verb + params -> typed [`Operation`]
//! 3. **Dispatch** (`dispatch`): existence guard, then the member handler in `domain`
//! 4. **Domain handlers** (`domain`): common members, motion, the property table

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod operation;
pub mod params;

pub use classify::classify;
pub use config::{ConfigSource, ServerConfig, SharedCatalogue};
pub use dispatch::{DeviceRequest, DeviceService};
pub use operation::{Operation, OperationError, OperationResponse, RequestError};
pub use params::Params;
