//! TCP Connector Adapter
//!
//! Production implementation of [`Connector`]: dials plain TCP with a
//! bounded connect timeout. Target connections are split so the sender owns
//! the write half while a background task drains the replies.

use crate::domain::errors::SessionError;
use crate::domain::ports::Connector;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

/// Dials source and target instances over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn dial(&self, addr: &str) -> Result<TcpStream, SessionError> {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(SessionError::connection(addr, e)),
            Err(_) => {
                return Err(SessionError::connection(
                    addr,
                    format!("timed out after {:?}", self.connect_timeout),
                ))
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("failed to set TCP_NODELAY on {}: {}", addr, e);
        }
        Ok(stream)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Source = TcpStream;
    type Target = OwnedWriteHalf;

    async fn connect_source(&self, addr: &str) -> Result<TcpStream, SessionError> {
        let stream = self.dial(addr).await?;
        tracing::info!("connected to source {}", addr);
        Ok(stream)
    }

    async fn connect_target(&self, addr: &str) -> Result<OwnedWriteHalf, SessionError> {
        let stream = self.dial(addr).await?;
        let (reader, writer) = stream.into_split();
        let addr = addr.to_string();
        tokio::spawn(async move {
            let stats = drain_replies(reader, &addr).await;
            tracing::debug!(
                "reply drainer for {} finished: {} replies, {} errors",
                addr,
                stats.replies,
                stats.errors
            );
        });
        Ok(writer)
    }
}

/// Counts kept by a reply drainer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub replies: u64,
    pub errors: u64,
}

/// Read and discard target replies until the connection closes.
///
/// Error replies are logged. Bulk-string bodies are skipped by length so
/// their content is never mistaken for a reply line.
pub async fn drain_replies<R>(reader: R, addr: &str) -> DrainStats
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut stats = DrainStats::default();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("reply stream from {} ended: {}", addr, e);
                break;
            }
        }
        stats.replies += 1;

        match line.first() {
            Some(b'-') => {
                stats.errors += 1;
                tracing::warn!(
                    "target {} rejected a command: {}",
                    addr,
                    String::from_utf8_lossy(&line[1..]).trim_end()
                );
            }
            Some(b'$') => {
                let len = std::str::from_utf8(&line[1..])
                    .ok()
                    .and_then(|s| s.trim_end().parse::<i64>().ok())
                    .unwrap_or(-1);
                if len >= 0 {
                    let body = len as u64 + 2;
                    let mut body_reader = (&mut reader).take(body);
                    let skipped = tokio::io::copy(&mut body_reader, &mut tokio::io::sink())
                        .await
                        .unwrap_or(0);
                    if skipped < body {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    stats
}
