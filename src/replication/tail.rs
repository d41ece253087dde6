//! Tail Forwarder
//!
//! Relays the source's live write-command stream to the target verbatim once
//! the snapshot has been applied. The bytes are already in the target wire
//! protocol, so nothing is parsed.

use crate::domain::errors::SessionError;
use crate::domain::ports::Connector;
use crate::infrastructure::resilient_sender::ResilientSender;
use crate::replication::buffer::SessionBuffer;
use tokio::io::AsyncRead;

/// Forward the live stream until the source read fails.
///
/// Bytes left in the buffer after the snapshot are sent first. This future
/// only completes with an error; callers stop it by dropping it.
pub async fn forward_live_stream<R, C>(
    source: &mut R,
    buffer: &mut SessionBuffer,
    sender: &mut ResilientSender<C>,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin + ?Sized,
    C: Connector,
{
    tracing::info!("tailing live command stream");
    let mut forwarded: u64 = 0;
    let mut chunks: u64 = 0;

    loop {
        let pending = buffer.unconsumed().len();
        if pending > 0 {
            sender.send(buffer.unconsumed()).await;
            buffer.consume(pending);
            forwarded += pending as u64;
            chunks += 1;
            if chunks % 1000 == 0 {
                tracing::debug!("tail: {} chunks, {} bytes forwarded", chunks, forwarded);
            }
        }

        let n = buffer
            .read_fresh(source)
            .await
            .map_err(SessionError::SourceRead)?;
        if n == 0 {
            tracing::warn!("source closed live stream after {} bytes", forwarded);
            return Err(SessionError::source_closed());
        }
    }
}
