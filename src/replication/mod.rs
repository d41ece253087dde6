//! Source Replication Module
//!
//! The replica side of the source's replication protocol, in session order:
//!
//! 1. **Framer**: send `SYNC`, read the `$<length>\r\n` preamble
//! 2. **Streamer**: copy exactly `<length>` snapshot bytes into the decoder pipe
//! 3. **Tail**: relay the live command stream to the target
//!
//! All three share one [`SessionBuffer`] owned by the session's network flow.

pub mod buffer;
pub mod framer;
pub mod streamer;
pub mod tail;

pub use buffer::{SessionBuffer, BUFFER_CAPACITY};
pub use framer::{read_snapshot_length, request_sync, HEADER_WINDOW, SYNC_COMMAND};
pub use streamer::stream_snapshot;
pub use tail::forward_live_stream;
