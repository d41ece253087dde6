//! Infrastructure Layer
//!
//! Cross-cutting components: target delivery and process shutdown.

pub mod resilient_sender;
pub mod shutdown;

pub use resilient_sender::{ResilientSender, SenderState};
pub use shutdown::{shutdown_signal, ShutdownController};
