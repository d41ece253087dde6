//! Handshake & Length Framer
//!
//! Sends the replication handshake to the source and extracts the declared
//! snapshot length from the reply preamble.
//!
//! The preamble is `$<decimal>\r\n`, possibly preceded by bare `\n`
//! keep-alives the source emits while it prepares the snapshot. The header
//! may arrive split over any number of reads.

use crate::domain::errors::SessionError;
use crate::replication::buffer::SessionBuffer;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Replication handshake sent to the source.
pub const SYNC_COMMAND: &[u8] = b"*1\r\n$4\r\nSYNC\r\n";

/// Bytes searched for the length header before giving up.
pub const HEADER_WINDOW: usize = 128;

/// Outcome of scanning the buffered preamble.
#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// Header found: snapshot length and index of the first snapshot byte.
    Found { length: u64, body_start: usize },
    /// The source answered with an error line.
    Refused(String),
    /// No complete header yet.
    Incomplete,
}

/// Write the handshake command to the source.
pub async fn request_sync<W>(source: &mut W) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    source
        .write_all(SYNC_COMMAND)
        .await
        .map_err(SessionError::SourceRead)?;
    source.flush().await.map_err(SessionError::SourceRead)?;
    tracing::info!("sync requested");
    Ok(())
}

/// Read until the snapshot length header is complete.
///
/// On success the buffer cursor sits on the first snapshot byte and any
/// snapshot bytes that arrived with the header remain buffered.
pub async fn read_snapshot_length<R>(
    source: &mut R,
    buffer: &mut SessionBuffer,
) -> Result<u64, SessionError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    buffer.clear();

    loop {
        let n = buffer
            .read_append(source)
            .await
            .map_err(SessionError::SourceRead)?;
        if n == 0 {
            if buffer.filled() == buffer.capacity() {
                return Err(SessionError::protocol(
                    "length header not found in bounded window",
                ));
            }
            return Err(SessionError::source_closed());
        }

        // Keep-alive newlines ahead of the header are noise.
        let leading = buffer.buffered().iter().take_while(|&&b| b == b'\n').count();
        if leading > 0 {
            buffer.discard_front(leading);
            tracing::debug!("ignored {} keep-alive byte(s) before snapshot header", leading);
        }

        match scan_header(buffer.buffered())? {
            Scan::Found { length, body_start } => {
                buffer.seek(body_start);
                tracing::info!("snapshot length {} bytes", length);
                return Ok(length);
            }
            Scan::Refused(line) => {
                return Err(SessionError::protocol(format!("source refused sync: {line}")));
            }
            Scan::Incomplete => {}
        }

        if buffer.filled() > HEADER_WINDOW {
            return Err(SessionError::protocol(
                "length header not found in bounded window",
            ));
        }
    }
}

/// Search `data` for `$<digits>\r\n`.
fn scan_header(data: &[u8]) -> Result<Scan, SessionError> {
    if data.first() == Some(&b'-') {
        if let Some(end) = find_crlf(data) {
            let line = String::from_utf8_lossy(&data[1..end]).into_owned();
            return Ok(Scan::Refused(line));
        }
        return Ok(Scan::Incomplete);
    }

    let mut i = 0;
    while i < data.len() {
        if data[i] != b'$' {
            i += 1;
            continue;
        }

        let digits_start = i + 1;
        let digits_end = data[digits_start..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map(|p| digits_start + p)
            .unwrap_or(data.len());

        // Digits (if any) run to the end of what we have: wait for more.
        if digits_end == data.len() || digits_end + 1 == data.len() {
            if data[digits_start..].iter().all(|b| b.is_ascii_digit() || *b == b'\r') {
                return Ok(Scan::Incomplete);
            }
        }

        if digits_end > digits_start
            && digits_end + 1 < data.len()
            && data[digits_end] == b'\r'
            && data[digits_end + 1] == b'\n'
        {
            let length = parse_decimal(&data[digits_start..digits_end])?;
            return Ok(Scan::Found {
                length,
                body_start: digits_end + 2,
            });
        }

        i = digits_start;
    }

    Ok(Scan::Incomplete)
}

fn parse_decimal(digits: &[u8]) -> Result<u64, SessionError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| SessionError::protocol("malformed snapshot length"))
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    // ===== Handshake Tests =====

    #[tokio::test]
    async fn test_request_sync_writes_literal_command() {
        let mut source = Builder::new().write(b"*1\r\n$4\r\nSYNC\r\n").build();
        request_sync(&mut source).await.unwrap();
    }

    // ===== Length Header Tests =====

    #[tokio::test]
    async fn test_header_in_single_read() {
        let mut source = Builder::new().read(b"$123\r\n").build();
        let mut buffer = SessionBuffer::new();

        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();
        assert_eq!(length, 123);
        assert_eq!(buffer.cursor(), 6);
        assert_eq!(buffer.filled(), 6);
    }

    #[tokio::test]
    async fn test_header_split_across_reads() {
        let mut source = Builder::new()
            .read(b"$")
            .read(b"123")
            .read(b"\r\n")
            .build();
        let mut buffer = SessionBuffer::new();

        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();
        assert_eq!(length, 123);
        assert_eq!(buffer.cursor(), 6);
        assert!(buffer.unconsumed().is_empty());
    }

    #[tokio::test]
    async fn test_split_cr_and_lf() {
        let mut source = Builder::new().read(b"$12\r").read(b"\nREDIS").build();
        let mut buffer = SessionBuffer::new();

        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();
        assert_eq!(length, 12);
        assert_eq!(buffer.unconsumed(), b"REDIS");
    }

    #[tokio::test]
    async fn test_snapshot_bytes_after_header_stay_buffered() {
        let mut source = Builder::new().read(b"$11\r\nhello world").build();
        let mut buffer = SessionBuffer::new();

        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();
        assert_eq!(length, 11);
        assert_eq!(buffer.unconsumed(), b"hello world");
    }

    #[tokio::test]
    async fn test_leading_newline_is_ignored() {
        let mut source = Builder::new().read(b"\n").read(b"$7\r\n").build();
        let mut buffer = SessionBuffer::new();

        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();
        assert_eq!(length, 7);
        assert_eq!(buffer.cursor(), 4);
    }

    #[tokio::test]
    async fn test_many_keepalives_do_not_count_toward_window() {
        let noise = vec![b'\n'; 200];
        let mut source = Builder::new().read(&noise).read(b"$7\r\n").build();
        let mut buffer = SessionBuffer::new();

        let length = read_snapshot_length(&mut source, &mut buffer).await.unwrap();
        assert_eq!(length, 7);
    }

    #[tokio::test]
    async fn test_header_not_found_in_window() {
        let junk = vec![b'x'; 129];
        let mut source = Builder::new().read(&junk).build();
        let mut buffer = SessionBuffer::new();

        let err = read_snapshot_length(&mut source, &mut buffer).await.unwrap_err();
        match err {
            SessionError::Protocol(msg) => {
                assert_eq!(msg, "length header not found in bounded window")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_window_exactly_full_keeps_reading() {
        let junk = vec![b'x'; 128];
        let mut source = Builder::new().read(&junk).read(b"$1\r\n").build();
        let mut buffer = SessionBuffer::new();

        assert_eq!(read_snapshot_length(&mut source, &mut buffer).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dollar_without_digits_is_skipped() {
        let mut source = Builder::new().read(b"$x$5\r\n").build();
        let mut buffer = SessionBuffer::new();

        assert_eq!(read_snapshot_length(&mut source, &mut buffer).await.unwrap(), 5);
        assert_eq!(buffer.cursor(), 6);
    }

    #[tokio::test]
    async fn test_overflowing_length_is_malformed() {
        let mut source = Builder::new().read(b"$99999999999999999999999\r\n").build();
        let mut buffer = SessionBuffer::new();

        let err = read_snapshot_length(&mut source, &mut buffer).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ref m) if m == "malformed snapshot length"));
    }

    #[tokio::test]
    async fn test_error_reply_is_refusal() {
        let mut source = Builder::new().read(b"-NOAUTH Authentication required.\r\n").build();
        let mut buffer = SessionBuffer::new();

        let err = read_snapshot_length(&mut source, &mut buffer).await.unwrap_err();
        assert!(err.to_string().contains("NOAUTH"));
    }

    #[tokio::test]
    async fn test_closed_source_is_read_error() {
        let mut source = Builder::new().read(b"$1").build();
        let mut buffer = SessionBuffer::new();

        let err = read_snapshot_length(&mut source, &mut buffer).await.unwrap_err();
        assert!(matches!(err, SessionError::SourceRead(_)));
    }

    #[test]
    fn test_scan_incomplete_cases() {
        assert_eq!(scan_header(b"").unwrap(), Scan::Incomplete);
        assert_eq!(scan_header(b"$").unwrap(), Scan::Incomplete);
        assert_eq!(scan_header(b"$12").unwrap(), Scan::Incomplete);
        assert_eq!(scan_header(b"$12\r").unwrap(), Scan::Incomplete);
        assert_eq!(scan_header(b"-ERR").unwrap(), Scan::Incomplete);
    }
}
