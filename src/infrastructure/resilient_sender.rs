//! Resilient Sender
//!
//! Delivers command payloads to the target. A failed write closes the broken
//! connection, redials until the target answers, and resends the identical
//! payload. Write failures never escape the sender.

use crate::domain::errors::SessionError;
use crate::domain::ports::Connector;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// While the target stays down, one redial failure in this many is logged
/// above debug level.
const REDIAL_LOG_EVERY: u64 = 100;

/// Sender state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Writes go to the current connection
    Connected,
    /// Dialing a replacement connection
    Reconnecting,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderState::Connected => write!(f, "connected"),
            SenderState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// At-least-once writer to the target instance.
///
/// A payload that was partially written before a failure is resent whole,
/// so the target may apply it twice. Snapshot commands are idempotent, which
/// makes this safe for the snapshot phase.
pub struct ResilientSender<C: Connector> {
    connector: Arc<C>,
    addr: String,
    conn: Option<C::Target>,
    state: SenderState,
    reconnect_delay: Duration,
    reconnects: u64,
    bytes_sent: u64,
}

impl<C: Connector> ResilientSender<C> {
    /// Dial the target once. A failure here is a session-level connection error.
    pub async fn connect(
        connector: Arc<C>,
        addr: impl Into<String>,
        reconnect_delay: Duration,
    ) -> Result<Self, SessionError> {
        let addr = addr.into();
        let conn = connector.connect_target(&addr).await?;
        tracing::info!("connected to target {}", addr);
        Ok(Self {
            connector,
            addr,
            conn: Some(conn),
            state: SenderState::Connected,
            reconnect_delay,
            reconnects: 0,
            bytes_sent: 0,
        })
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Number of times the target connection was replaced.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Total payload bytes delivered.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Write `payload` to the target, reconnecting and resending until it succeeds.
    pub async fn send(&mut self, payload: &[u8]) {
        loop {
            if let Some(conn) = self.conn.as_mut() {
                match write_payload(conn, payload).await {
                    Ok(()) => {
                        if self.state == SenderState::Reconnecting {
                            tracing::info!("target {} restored, payload resent", self.addr);
                        }
                        self.state = SenderState::Connected;
                        self.bytes_sent += payload.len() as u64;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "write to target {} failed ({} bytes): {}, reconnecting",
                            self.addr,
                            payload.len(),
                            e
                        );
                    }
                }
            }

            self.state = SenderState::Reconnecting;
            self.close().await;
            self.redial().await;
        }
    }

    /// Close the current connection. Safe to call when already closed.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.shutdown().await;
        }
    }

    /// Dial the target until a connection succeeds.
    async fn redial(&mut self) {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            match self.connector.connect_target(&self.addr).await {
                Ok(conn) => {
                    self.conn = Some(conn);
                    self.reconnects += 1;
                    tracing::info!(
                        "reconnected to target {} after {} attempt(s)",
                        self.addr,
                        attempts
                    );
                    return;
                }
                Err(e) if attempts == 1 => {
                    tracing::error!("reconnect to target {} failed: {}", self.addr, e);
                }
                Err(e) if attempts % REDIAL_LOG_EVERY == 0 => {
                    tracing::warn!(
                        "target {} still unreachable after {} attempts: {}",
                        self.addr,
                        attempts,
                        e
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        "reconnect attempt {} to target {} failed: {}",
                        attempts,
                        self.addr,
                        e
                    );
                }
            }
            if !self.reconnect_delay.is_zero() {
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }
    }
}

async fn write_payload<W>(conn: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    conn.write_all(payload).await?;
    conn.flush().await
}
