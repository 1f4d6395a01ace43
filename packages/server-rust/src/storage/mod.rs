//! In-memory device state storage.
//!
//! State lives only for the process lifetime; nothing is persisted across
//! restarts.

pub mod state_store;

pub use state_store::{SharedStore, StateStore};
