//! Snapshot Streamer
//!
//! Copies exactly the declared number of snapshot bytes from the source into
//! the hand-off pipe, reusing the session buffer for every read.

use crate::domain::errors::SessionError;
use crate::replication::buffer::SessionBuffer;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Forward `length` snapshot bytes to `sink`.
///
/// Bytes already buffered after the length header are forwarded first. On
/// return the buffer cursor sits just past the last snapshot byte, so any
/// live-tail bytes that arrived in the same read stay buffered for the tail
/// forwarder. The sink is shut down once the last byte is written.
pub async fn stream_snapshot<R, W>(
    source: &mut R,
    buffer: &mut SessionBuffer,
    length: u64,
    mut sink: W,
) -> Result<u64, SessionError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut remaining = length;
    let mut reads = 0u64;

    loop {
        let available = buffer.unconsumed().len() as u64;
        let take = remaining.min(available) as usize;
        if take > 0 {
            sink.write_all(&buffer.unconsumed()[..take])
                .await
                .map_err(|_| SessionError::HandOffClosed)?;
            buffer.consume(take);
            remaining -= take as u64;
        }

        if remaining == 0 {
            break;
        }

        let n = buffer
            .read_fresh(source)
            .await
            .map_err(SessionError::SourceRead)?;
        if n == 0 {
            return Err(SessionError::source_closed());
        }
        reads += 1;
        if reads % 1024 == 0 {
            tracing::debug!(
                "snapshot streaming: {} of {} bytes remaining",
                remaining,
                length
            );
        }
    }

    sink.shutdown().await.map_err(|_| SessionError::HandOffClosed)?;
    tracing::info!("snapshot streamed ({} bytes)", length);
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::framer::read_snapshot_length;
    use tokio::io::AsyncReadExt;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_streams_buffered_payload() {
        let mut source = Builder::new().read(b"$11\r\nhello world").build();
        let mut buffer = SessionBuffer::new();
        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();

        let (writer, mut reader) = tokio::io::duplex(64);
        let sent = stream_snapshot(&mut source, &mut buffer, length, writer)
            .await
            .unwrap();

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(sent, 11);
        assert_eq!(received, b"hello world");
        assert!(buffer.unconsumed().is_empty());
    }

    #[tokio::test]
    async fn test_streams_across_reads_and_keeps_tail() {
        let mut source = Builder::new()
            .read(b"$10\r\n0123")
            .read(b"456")
            .read(b"789*1\r\n$4\r\nPING\r\n")
            .build();
        let mut buffer = SessionBuffer::new();
        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();

        let (writer, mut reader) = tokio::io::duplex(64);
        stream_snapshot(&mut source, &mut buffer, length, writer)
            .await
            .unwrap();

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"0123456789");
        assert_eq!(buffer.unconsumed(), b"*1\r\n$4\r\nPING\r\n");
        assert!(buffer.cursor() <= buffer.filled());
    }

    #[tokio::test]
    async fn test_backpressure_with_small_pipe() {
        let payload = vec![7u8; 10_000];
        let mut preamble = b"$10000\r\n".to_vec();
        preamble.extend_from_slice(&payload[..100]);
        let mut source = Builder::new().read(&preamble).read(&payload[100..]).build();
        let mut buffer = SessionBuffer::new();
        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();

        let (writer, mut reader) = tokio::io::duplex(16);
        let consumer = tokio::spawn(async move {
            let mut received = Vec::new();
            reader.read_to_end(&mut received).await.unwrap();
            received
        });

        stream_snapshot(&mut source, &mut buffer, length, writer)
            .await
            .unwrap();
        assert_eq!(consumer.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_zero_length_snapshot() {
        let mut source = Builder::new().read(b"$0\r\n").build();
        let mut buffer = SessionBuffer::new();
        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();

        let (writer, mut reader) = tokio::io::duplex(16);
        assert_eq!(
            stream_snapshot(&mut source, &mut buffer, length, writer)
                .await
                .unwrap(),
            0
        );
        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_source_eof_mid_snapshot() {
        let mut source = Builder::new().read(b"$20\r\nshort").build();
        let mut buffer = SessionBuffer::new();
        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();

        let (writer, _reader) = tokio::io::duplex(64);
        let err = stream_snapshot(&mut source, &mut buffer, length, writer)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SourceRead(_)));
    }

    #[tokio::test]
    async fn test_dropped_decoder_is_hand_off_error() {
        let mut source = Builder::new().read(b"$5\r\nabcde").build();
        let mut buffer = SessionBuffer::new();
        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();

        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let err = stream_snapshot(&mut source, &mut buffer, length, writer)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::HandOffClosed));
    }
}
