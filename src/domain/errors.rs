//! Session Errors
//!
//! Every stage of a migration session reports failure through [`SessionError`].
//! Any variant that reaches the supervisor ends the session and triggers a
//! full resync after the backoff interval.

use std::io;

/// Failure taxonomy for one migration session.
///
/// Target write failures are absent on purpose: the resilient sender recovers
/// them in place and they never reach the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Dialing the source or the target failed.
    #[error("connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    /// The source reply preamble could not be framed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The snapshot payload could not be decoded or translated.
    #[error("snapshot decode error: {0}")]
    Decode(String),

    /// Reading from the source failed while streaming or tailing.
    #[error("source read failed: {0}")]
    SourceRead(#[source] io::Error),

    /// The decoder side of the snapshot pipe went away mid-stream.
    #[error("snapshot pipe closed by decoder")]
    HandOffClosed,
}

impl SessionError {
    pub fn connection(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// A source socket that reports end-of-stream.
    pub fn source_closed() -> Self {
        Self::SourceRead(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "source closed the connection",
        ))
    }
}
