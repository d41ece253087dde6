//! Connector Port
//!
//! Defines how a session obtains its source and target links.
//! The production implementation dials TCP; tests substitute scripted streams.

use crate::domain::errors::SessionError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Dials source and target endpoints.
///
/// Implementations do no retrying of their own: the session supervisor
/// restarts the whole session on a failed dial, and the resilient sender
/// loops on target dials.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Bidirectional source link: the handshake is written, everything else is read.
    type Source: AsyncRead + AsyncWrite + Unpin + Send;

    /// Write side of a target link.
    type Target: AsyncWrite + Unpin + Send;

    /// Open a connection to the source instance.
    async fn connect_source(&self, addr: &str) -> Result<Self::Source, SessionError>;

    /// Open a connection to the target instance.
    async fn connect_target(&self, addr: &str) -> Result<Self::Target, SessionError>;
}
