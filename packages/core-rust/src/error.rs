//! Error taxonomy carried in-band by every response envelope.
//!
//! Domain failures are never transport failures: each [`AlpacaError`] maps to
//! a fixed `ErrorNumber` and is returned inside an HTTP 200 envelope.

use thiserror::Error;

/// Fixed `ErrorNumber` codes used on the wire.
pub mod codes {
    /// Success.
    pub const OK: i32 = 0;
    /// No device with the requested identity is configured.
    pub const NOT_FOUND: i32 = 0x400;
    /// Capability flag is false, or the member is not implemented.
    pub const NOT_IMPLEMENTED: i32 = 0x401;
    /// Argument outside its declared domain.
    pub const INVALID_VALUE: i32 = 0x402;
    /// Operation needs a state-machine state the device is not in.
    pub const NOT_IDLE: i32 = 0x40C;
    /// An internal step of the operation failed.
    pub const ACTION_FAILED: i32 = 0x40D;
    /// Unexpected failure outside the taxonomy.
    pub const UNEXPECTED: i32 = 0x500;
}

/// Domain error raised by a device operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlpacaError {
    #[error("Device {device_type}:{device_number} not found")]
    NotFound {
        device_type: String,
        device_number: u32,
    },

    #[error("{0}")]
    InvalidValue(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    NotIdle(String),

    #[error("{0}")]
    ActionFailed(String),
}

impl AlpacaError {
    #[must_use]
    pub fn not_found(device_type: impl Into<String>, device_number: u32) -> Self {
        Self::NotFound {
            device_type: device_type.into(),
            device_number,
        }
    }

    #[must_use]
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }

    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented(message.into())
    }

    #[must_use]
    pub fn not_idle(message: impl Into<String>) -> Self {
        Self::NotIdle(message.into())
    }

    #[must_use]
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::ActionFailed(message.into())
    }

    /// The `ErrorNumber` reported for this error.
    #[must_use]
    pub fn error_number(&self) -> i32 {
        match self {
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::NotImplemented(_) => codes::NOT_IMPLEMENTED,
            Self::InvalidValue(_) => codes::INVALID_VALUE,
            Self::NotIdle(_) => codes::NOT_IDLE,
            Self::ActionFailed(_) => codes::ACTION_FAILED,
        }
    }
}
