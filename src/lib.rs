//! redis-porter Library
//!
//! Live migration from a source key-value instance to a target instance:
//! replication handshake, snapshot decoding and translation, resilient
//! delivery, and live-tail forwarding under a retrying session supervisor.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod replication;

// Re-export commonly used types
pub use adapters::outbound::{RdbDecoder, TcpConnector};
pub use application::MigrationService;
pub use config::{load_config, Config, ConfigError};
pub use domain::entities::{SnapshotEntry, SnapshotStats};
pub use domain::errors::SessionError;
pub use domain::ports::{Connector, SnapshotDecoder, SnapshotHandler};
pub use domain::services::CommandTranslator;
pub use infrastructure::{shutdown_signal, ResilientSender, ShutdownController};
