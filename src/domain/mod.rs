//! Domain Layer
//!
//! Snapshot entries, the session error taxonomy, the ports the session
//! depends on, and the pure command translator.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;

pub use entities::{SnapshotEntry, SnapshotStats};
pub use errors::SessionError;
