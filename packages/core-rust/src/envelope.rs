//! Response envelope and server transaction numbering.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{codes, AlpacaError};

/// Standard Alpaca response wrapper.
///
/// `Value` is omitted for method calls that return nothing and for errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "ClientTransactionID")]
    pub client_transaction_id: u32,
    #[serde(rename = "ServerTransactionID")]
    pub server_transaction_id: u32,
    #[serde(rename = "ErrorNumber")]
    pub error_number: i32,
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
}

impl<T> Envelope<T> {
    /// Successful envelope, optionally carrying a value.
    #[must_use]
    pub fn ok(client_transaction_id: u32, server_transaction_id: u32, value: Option<T>) -> Self {
        Self {
            client_transaction_id,
            server_transaction_id,
            error_number: codes::OK,
            error_message: String::new(),
            value,
        }
    }

    /// Error envelope for a taxonomy error.
    #[must_use]
    pub fn error(
        client_transaction_id: u32,
        server_transaction_id: u32,
        error: &AlpacaError,
    ) -> Self {
        Self::raw_error(
            client_transaction_id,
            server_transaction_id,
            error.error_number(),
            error.to_string(),
        )
    }

    /// Error envelope with an explicit code, used for failures outside the taxonomy.
    #[must_use]
    pub fn raw_error(
        client_transaction_id: u32,
        server_transaction_id: u32,
        error_number: i32,
        error_message: String,
    ) -> Self {
        Self {
            client_transaction_id,
            server_transaction_id,
            error_number,
            error_message,
            value: None,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error_number == codes::OK
    }
}

/// Process-wide `ServerTransactionID` source shared by every device.
///
/// The first issued id is 1. Ids are unique and strictly increasing for the
/// first `u32::MAX` requests of the process.
#[derive(Debug, Default)]
pub struct TransactionCounter {
    last: AtomicU32,
}

impl TransactionCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increments and returns the counter.
    pub fn next_transaction_id(&self) -> u32 {
        self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// The most recently issued id (0 before the first call).
    #[must_use]
    pub fn current(&self) -> u32 {
        self.last.load(Ordering::Relaxed)
    }
}
