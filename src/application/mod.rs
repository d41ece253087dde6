//! Application Layer
//!
//! Use cases that drive a migration session through the domain ports.

mod migration_service;
mod snapshot_applier;

pub use migration_service::MigrationService;
pub use snapshot_applier::SnapshotApplier;
