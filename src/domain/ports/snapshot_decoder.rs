//! Snapshot Decoder Port
//!
//! The snapshot decoder turns raw snapshot bytes into [`SnapshotEntry`]
//! values. The session only depends on this contract, never on a concrete
//! snapshot format.

use crate::domain::entities::SnapshotEntry;
use crate::domain::errors::SessionError;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Receives decoded entries, one call per entry, in snapshot order.
///
/// The decoder awaits each call before decoding further, so a handler that
/// blocks (for instance on a target reconnect) stalls decoding and, through
/// the bounded pipe, the network reader.
#[async_trait]
pub trait SnapshotHandler: Send {
    async fn handle(&mut self, entry: SnapshotEntry) -> Result<(), SessionError>;
}

/// Decodes a snapshot byte stream into entries.
#[async_trait]
pub trait SnapshotDecoder: Send + Sync {
    /// Decode the whole snapshot from `reader`, emitting `Begin` first and
    /// `End` last. Returns once the end marker has been handled and the
    /// reader is drained.
    async fn decode(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        handler: &mut dyn SnapshotHandler,
    ) -> Result<(), SessionError>;
}
