mod connector;
mod snapshot_decoder;

pub use connector::Connector;
pub use snapshot_decoder::{SnapshotDecoder, SnapshotHandler};
